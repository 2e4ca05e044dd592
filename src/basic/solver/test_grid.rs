//! Shared steady-state test grid.
//!
//! A 3-bus radial network with analytically known solution:
//!
//! ```text
//!                                                  shunt0 (ys)
//!                       (y0, ys0)           (y1)       |
//! source --yref-- bus0 --branch0-- bus1 --branch1--  bus2
//!                  |                |                  |
//!               load012          load345          load6 (not connected)
//! ```
//!
//! Branch 1 carries a 30° phase shift, so bus 2 sits at a shifted phase
//! reference. Loads cover all three behavioural classes on both buses. The
//! shunt admittance is chosen so that the expected voltages come out at
//! round magnitudes and angles.

use num_complex::Complex64;

use crate::basic::common::*;
use crate::basic::param::*;
use crate::basic::tensor::*;
use crate::basic::topology::{BranchIdx, GroupedIdx, Topology};
use crate::basic::ybus::{YBus, YBusStructure};

use super::*;

pub(crate) const SHIFT_VAL: f64 = DEG_30;
pub(crate) const VREF: f64 = 1.1;
pub(crate) const V0: f64 = 1.08;
pub(crate) const V1: f64 = 0.97;
pub(crate) const V2: f64 = 0.90;

pub(crate) fn deg(x: f64) -> f64 {
    x * DEG_30 / 30.0
}

pub(crate) struct TestGrid {
    pub u0: Complex64,
    pub u1: Complex64,
    pub u2: Complex64,
    pub shift: Complex64,
    pub y0: Complex64,
    pub ys0: Complex64,
    pub y1: Complex64,
    pub y0_0: Complex64,
    pub yref: Complex64,
    pub ys: Complex64,
    pub branch0_i_f: Complex64,
    pub branch0_i_t: Complex64,
    pub branch1_i_f: Complex64,
    pub branch1_i_t: Complex64,
    pub source_inj: Complex64,
    pub s0_load_inj: Complex64,
    pub s1_load_inj: Complex64,
}

impl Default for TestGrid {
    fn default() -> Self {
        let u0 = Complex64::from_polar(V0, deg(-1.0));
        let u1 = Complex64::from_polar(V1, deg(-4.0));
        let u2 = Complex64::from_polar(V2, deg(-37.0));
        let shift = Complex64::from_polar(1.0, SHIFT_VAL);
        let y0 = Complex64::new(1.0, -2.0);
        let ys0 = Complex64::new(0.05, 0.2);
        let y1 = Complex64::new(3.0, -4.0);
        let y0_0 = Complex64::new(0.5, 0.5);
        let yref = Complex64::new(10.0, -50.0);
        let branch0_i_f = (u0 - u1) * y0 + u0 * ys0;
        let branch0_i_t = (u1 - u0) * y0 + u1 * ys0;
        let branch1_i_f = (u1 - u2 * shift) * y1;
        let branch1_i_t = (u2 - u1 * shift.conj()) * y1;
        let source_inj = yref * (Complex64::new(VREF, 0.0) - u0);
        let i0_load_inj = -source_inj + branch0_i_f;
        let i1_load_inj = branch0_i_t + branch1_i_f;
        let s0_load_inj = i0_load_inj.conj() * u0;
        let s1_load_inj = i1_load_inj.conj() * u1;
        let i2_shunt_inj = branch1_i_t;
        let ys = -i2_shunt_inj / u2;
        Self {
            u0,
            u1,
            u2,
            shift,
            y0,
            ys0,
            y1,
            y0_0,
            yref,
            ys,
            branch0_i_f,
            branch0_i_t,
            branch1_i_f,
            branch1_i_t,
            source_inj,
            s0_load_inj,
            s1_load_inj,
        }
    }
}

impl TestGrid {
    pub fn topo(&self) -> Topology {
        use LoadGenType::*;
        Topology {
            slack_bus: 0,
            phase_shift: vec![0.0, 0.0, -SHIFT_VAL],
            branch_bus_idx: vec![BranchIdx::new(0, 1), BranchIdx::new(1, 2)],
            sources_per_bus: GroupedIdx::from_offsets(vec![0, 1, 1, 1]),
            shunts_per_bus: GroupedIdx::from_offsets(vec![0, 0, 0, 1]),
            load_gens_per_bus: GroupedIdx::from_offsets(vec![0, 3, 6, 7]),
            load_gen_type: vec![ConstPq, ConstI, ConstY, ConstPq, ConstI, ConstY, ConstPq],
            ..Default::default()
        }
    }

    pub fn param<S: Symmetry>(&self) -> MathModelParam<S> {
        let zero = Complex64::new(0.0, 0.0);
        let branch0 = BranchCalcParam {
            yff: S::tensor_from_sequence(self.y0 + self.ys0, self.y0_0 + self.ys0),
            yft: S::tensor_from_sequence(-self.y0, -self.y0_0),
            ytf: S::tensor_from_sequence(-self.y0, -self.y0_0),
            ytt: S::tensor_from_sequence(self.y0 + self.ys0, self.y0_0 + self.ys0),
        };
        let branch1 = BranchCalcParam {
            yff: S::tensor_from_seq3(zero, self.y1, self.y1),
            yft: S::tensor_from_seq3(zero, -self.y1 * self.shift, -self.y1 * self.shift.conj()),
            ytf: S::tensor_from_seq3(zero, -self.y1 * self.shift.conj(), -self.y1 * self.shift),
            ytt: S::tensor_from_seq3(zero, self.y1, self.y1),
        };
        MathModelParam {
            branch_param: vec![branch0, branch1],
            shunt_param: vec![S::tensor_from_sequence(self.ys, self.ys * 0.2)],
            source_param: vec![SourceCalcParam {
                y1: self.yref,
                y0: self.yref,
            }],
        }
    }

    pub fn y_bus<S: Symmetry>(&self) -> YBus<S> {
        let topo = self.topo();
        let structure = std::sync::Arc::new(YBusStructure::new(&topo));
        YBus::new(structure, &self.param::<S>())
    }

    pub fn pf_input<S: Symmetry>(&self) -> PowerFlowInput<S> {
        let s_inj = self.sym_s_injection();
        PowerFlowInput {
            source: vec![Complex64::new(VREF, 0.0)],
            s_injection: s_inj.into_iter().map(|s| S::Complex::splat(s)).collect(),
        }
    }

    /// Injections that reproduce the reference state, per load class.
    pub fn sym_s_injection(&self) -> Vec<Complex64> {
        vec![
            self.s0_load_inj / 3.0,
            self.s0_load_inj / 3.0 / V0,
            self.s0_load_inj / 3.0 / V0 / V0,
            self.s1_load_inj / 3.0,
            self.s1_load_inj / 3.0 / V1,
            self.s1_load_inj / 3.0 / V1 / V1,
            Complex64::new(0.0, 0.0),
        ]
    }

    /// Constant-impedance only variant: loads 2 and 5 triple, others vanish.
    pub fn pf_input_z<S: Symmetry>(&self) -> PowerFlowInput<S> {
        let mut input = self.pf_input::<S>();
        for i in 0..6 {
            if i % 3 == 2 {
                input.s_injection[i] = input.s_injection[i].scale(3.0);
            } else {
                input.s_injection[i] = S::Complex::zero();
            }
        }
        input
    }

    pub fn output_ref<S: Symmetry>(&self) -> SolverOutput<S> {
        let embed = S::embed;
        let splat = S::Complex::splat;
        let i0_load = -self.source_inj + self.branch0_i_f;
        let i1_load = self.branch0_i_t + self.branch1_i_f;
        SolverOutput {
            u: vec![embed(self.u0), embed(self.u1), embed(self.u2)],
            bus_injection: vec![
                splat((self.branch0_i_f).conj() * self.u0),
                splat(self.branch0_i_t.conj() * self.u1 + self.branch1_i_f.conj() * self.u1),
                splat(Complex64::new(0.0, 0.0)),
            ],
            branch: vec![
                BranchSolverOutput {
                    s_f: splat(self.branch0_i_f.conj() * self.u0),
                    s_t: splat(self.branch0_i_t.conj() * self.u1),
                    i_f: embed(self.branch0_i_f),
                    i_t: embed(self.branch0_i_t),
                },
                BranchSolverOutput {
                    s_f: splat(self.branch1_i_f.conj() * self.u1),
                    s_t: splat(self.branch1_i_t.conj() * self.u2),
                    i_f: embed(self.branch1_i_f),
                    i_t: embed(self.branch1_i_t),
                },
            ],
            source: vec![ApplianceSolverOutput {
                s: splat(self.source_inj.conj() * self.u0),
                i: embed(self.source_inj),
            }],
            shunt: vec![ApplianceSolverOutput {
                s: splat(self.branch1_i_t.conj() * self.u2),
                i: embed(self.branch1_i_t),
            }],
            load_gen: (0..7)
                .map(|k| match k {
                    0..=2 => ApplianceSolverOutput {
                        s: splat(self.s0_load_inj / 3.0),
                        i: embed(i0_load / 3.0),
                    },
                    3..=5 => ApplianceSolverOutput {
                        s: splat(self.s1_load_inj / 3.0),
                        i: embed(i1_load / 3.0),
                    },
                    _ => ApplianceSolverOutput::zero(),
                })
                .collect(),
        }
    }

    /// Reference for the constant-impedance variant.
    pub fn output_ref_z<S: Symmetry>(&self) -> SolverOutput<S> {
        let mut output = self.output_ref::<S>();
        for i in 0..6 {
            if i % 3 == 2 {
                output.load_gen[i].s = output.load_gen[i].s.scale(3.0);
                output.load_gen[i].i = output.load_gen[i].i.scale(3.0);
            } else {
                output.load_gen[i] = ApplianceSolverOutput::zero();
            }
        }
        output
    }
}

pub(crate) fn check_close<S: Symmetry>(x: S::Complex, y: S::Complex, tol: f64, what: &str) {
    let diff = (x - y).max_cabs();
    assert!(diff < tol, "{what}: {x:?} != {y:?} (diff {diff})");
}

pub(crate) fn assert_output<S: Symmetry>(
    output: &SolverOutput<S>,
    reference: &SolverOutput<S>,
    normalize_phase: bool,
    tol: f64,
) {
    // the angle-free estimate is defined up to a global rotation; align it
    // on bus 0 before comparing
    let offset = if normalize_phase {
        let out0 = output.u[0].pos_seq();
        let ref0 = reference.u[0].pos_seq();
        (out0 / out0.norm()) * (ref0.conj() / ref0.norm())
    } else {
        Complex64::new(1.0, 0.0)
    };
    for (i, (x, y)) in output.u.iter().zip(&reference.u).enumerate() {
        check_close::<S>(*x, y.mul_scalar(offset), tol, &format!("u[{i}]"));
    }
    for (i, (x, y)) in output
        .bus_injection
        .iter()
        .zip(&reference.bus_injection)
        .enumerate()
    {
        check_close::<S>(*x, *y, tol, &format!("bus_injection[{i}]"));
    }
    for (i, (x, y)) in output.branch.iter().zip(&reference.branch).enumerate() {
        check_close::<S>(x.s_f, y.s_f, tol, &format!("branch[{i}].s_f"));
        check_close::<S>(x.s_t, y.s_t, tol, &format!("branch[{i}].s_t"));
        check_close::<S>(x.i_f, y.i_f.mul_scalar(offset), tol, &format!("branch[{i}].i_f"));
        check_close::<S>(x.i_t, y.i_t.mul_scalar(offset), tol, &format!("branch[{i}].i_t"));
    }
    for (i, (x, y)) in output.source.iter().zip(&reference.source).enumerate() {
        check_close::<S>(x.s, y.s, tol, &format!("source[{i}].s"));
        check_close::<S>(x.i, y.i.mul_scalar(offset), tol, &format!("source[{i}].i"));
    }
    for (i, (x, y)) in output.load_gen.iter().zip(&reference.load_gen).enumerate() {
        check_close::<S>(x.s, y.s, tol, &format!("load_gen[{i}].s"));
        check_close::<S>(x.i, y.i.mul_scalar(offset), tol, &format!("load_gen[{i}].i"));
    }
    for (i, (x, y)) in output.shunt.iter().zip(&reference.shunt).enumerate() {
        check_close::<S>(x.s, y.s, tol, &format!("shunt[{i}].s"));
        check_close::<S>(x.i, y.i.mul_scalar(offset), tol, &format!("shunt[{i}].i"));
    }
}

/// Power measurement helper, identical variance on both components.
pub(crate) fn power_meas<S: Symmetry>(s: Complex64, var: f64) -> PowerSensorCalcParam<S> {
    PowerSensorCalcParam {
        real_component: RandVar {
            value: S::Real::splat(s.re),
            variance: S::Real::splat(var),
        },
        imag_component: RandVar {
            value: S::Real::splat(s.im),
            variance: S::Real::splat(var),
        },
    }
}

pub(crate) fn voltage_meas<S: Symmetry>(u: Complex64, var: f64) -> VoltageSensorCalcParam<S> {
    VoltageSensorCalcParam {
        value: S::embed(u),
        variance: var,
    }
}

pub(crate) fn voltage_meas_no_angle<S: Symmetry>(
    mag: f64,
    var: f64,
) -> VoltageSensorCalcParam<S> {
    VoltageSensorCalcParam {
        value: S::Complex::from_re_im(S::Real::splat(mag), S::Real::splat(f64::NAN)),
        variance: var,
    }
}

impl TestGrid {
    /// Sensor layout for the power-sensor state-estimation tests:
    /// bus0 carries a voltage and an injection sensor, the source is measured
    /// twice, loads 3..6 and the shunt are measured, branch0 is measured on
    /// both sides (twice on the to side), branch1 on the to side.
    pub fn se_topo_power(&self) -> Topology {
        let mut topo = self.topo();
        topo.voltage_sensors_per_bus = GroupedIdx::from_offsets(vec![0, 1, 1, 3]);
        topo.power_sensors_per_bus = GroupedIdx::from_offsets(vec![0, 1, 1, 1]);
        topo.power_sensors_per_source = GroupedIdx::from_offsets(vec![0, 2]);
        topo.power_sensors_per_load_gen = GroupedIdx::from_offsets(vec![0, 0, 0, 0, 1, 2, 3, 4]);
        topo.power_sensors_per_shunt = GroupedIdx::from_offsets(vec![0, 1]);
        topo.power_sensors_per_branch_from = GroupedIdx::from_offsets(vec![0, 1, 1]);
        topo.power_sensors_per_branch_to = GroupedIdx::from_offsets(vec![0, 2, 3]);
        topo.current_sensors_per_branch_from = GroupedIdx::from_offsets(vec![0, 0, 0]);
        topo.current_sensors_per_branch_to = GroupedIdx::from_offsets(vec![0, 0, 0]);
        topo
    }

    /// Same layout with the branch flows measured by current sensors.
    pub fn se_topo_current(&self) -> Topology {
        let mut topo = self.se_topo_power();
        topo.power_sensors_per_branch_from = GroupedIdx::from_offsets(vec![0, 0, 0]);
        topo.power_sensors_per_branch_to = GroupedIdx::from_offsets(vec![0, 0, 0]);
        topo.current_sensors_per_branch_from = GroupedIdx::from_offsets(vec![0, 1, 1]);
        topo.current_sensors_per_branch_to = GroupedIdx::from_offsets(vec![0, 2, 3]);
        topo
    }

    fn se_input_without_flow_sensors<S: Symmetry>(&self) -> StateEstimationInput<S> {
        let s_source = self.source_inj.conj() * self.u0;
        let s_shunt = self.branch1_i_t.conj() * self.u2;
        let sum_s = s_source + self.s0_load_inj;
        StateEstimationInput {
            shunt_status: vec![true],
            load_gen_status: vec![true, true, true, true, true, true, false],
            source_status: vec![true],
            measured_voltage: vec![
                voltage_meas::<S>(self.u0, 1.0),
                voltage_meas::<S>(self.u2, 1.0),
                voltage_meas::<S>(self.u2, 1.0),
            ],
            measured_bus_injection: vec![power_meas::<S>(sum_s, 0.5)],
            measured_source_power: vec![
                power_meas::<S>(s_source, 0.5),
                power_meas::<S>(s_source, 0.5),
            ],
            measured_load_gen_power: vec![
                power_meas::<S>(self.s1_load_inj / 3.0, 0.5),
                power_meas::<S>(self.s1_load_inj / 3.0, 0.5),
                power_meas::<S>(self.s1_load_inj / 3.0, 0.5),
                // rubbish value on the disconnected load
                power_meas::<S>(Complex64::new(500.0, 0.0), 0.5),
            ],
            measured_shunt_power: vec![power_meas::<S>(s_shunt, 0.5)],
            ..Default::default()
        }
    }

    pub fn se_input_angle<S: Symmetry>(&self) -> StateEstimationInput<S> {
        let mut input = self.se_input_without_flow_sensors::<S>();
        let s_f0 = self.branch0_i_f.conj() * self.u0;
        let s_t0 = self.branch0_i_t.conj() * self.u1;
        let s_t1 = self.branch1_i_t.conj() * self.u2;
        input.measured_branch_from_power = vec![power_meas::<S>(s_f0, 0.5)];
        input.measured_branch_to_power = vec![
            power_meas::<S>(s_t0, 0.5),
            power_meas::<S>(s_t0, 0.5),
            power_meas::<S>(s_t1, 0.5),
        ];
        input
    }

    pub fn se_input_no_angle<S: Symmetry>(&self) -> StateEstimationInput<S> {
        let mut input = self.se_input_angle::<S>();
        input.measured_voltage[0] = voltage_meas_no_angle::<S>(V0, 1.0);
        input.measured_voltage[1] = voltage_meas_no_angle::<S>(V2, 1.0);
        // the third sensor keeps its angle; it is ignored when combining
        input
    }

    /// Constant-impedance variant: loads 0, 1, 3, 4 switched off, the
    /// remaining sensor on load 5 scaled accordingly.
    pub fn se_input_angle_const_z<S: Symmetry>(&self) -> StateEstimationInput<S> {
        let mut input = self.se_input_angle::<S>();
        input.load_gen_status[0] = false;
        input.load_gen_status[1] = false;
        input.load_gen_status[3] = false;
        input.load_gen_status[4] = false;
        input.measured_load_gen_power[2] = power_meas::<S>(self.s1_load_inj, 0.5);
        input
    }

    pub fn se_input_current<S: Symmetry>(
        &self,
        angle_type: AngleMeasurementType,
    ) -> StateEstimationInput<S> {
        let mut input = self.se_input_without_flow_sensors::<S>();
        let make = |i: Complex64, u: Complex64| {
            let z = match angle_type {
                AngleMeasurementType::GlobalAngle => S::embed(i),
                // local frame: magnitude with the angle of u·conj(i)
                AngleMeasurementType::LocalAngle => S::Complex::splat(
                    Complex64::from_polar(i.norm(), (u * i.conj()).arg()),
                ),
            };
            CurrentSensorCalcParam {
                angle_measurement_type: angle_type,
                measurement: PowerSensorCalcParam {
                    real_component: RandVar {
                        value: z.re(),
                        variance: S::Real::splat(0.5),
                    },
                    imag_component: RandVar {
                        value: z.im(),
                        variance: S::Real::splat(0.5),
                    },
                },
            }
        };
        input.measured_branch_from_current = vec![make(self.branch0_i_f, self.u0)];
        input.measured_branch_to_current = vec![
            make(self.branch0_i_t, self.u1),
            make(self.branch0_i_t, self.u1),
            make(self.branch1_i_t, self.u2),
        ];
        input
    }

    /// SE reference: the power-flow reference with the de-energised loads
    /// (0, 1, 3, 4) zeroed and load 5 absorbing each bus's remainder.
    pub fn se_output_ref_z<S: Symmetry>(&self) -> SolverOutput<S> {
        self.output_ref_z::<S>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reference voltages are fixed literals; any drift in the polar
    /// construction of the fixture shows up here first.
    #[test]
    fn test_reference_voltages_pin_down() {
        let grid = TestGrid::default();
        let close = |x: Complex64, re: f64, im: f64| {
            assert!(
                (x.re - re).abs() < 1e-9 && (x.im - im).abs() < 1e-9,
                "{x} != {re} + j{im}"
            );
        };
        close(grid.u0, 1.079835510768903, -0.018848598952266);
        close(grid.u1, 0.967637128752029, -0.067663779531802);
        close(grid.u2, 0.718771959042563, -0.541633520836843);
        assert!((grid.u0.norm() - V0).abs() < 1e-12);
        assert!((grid.u1.norm() - V1).abs() < 1e-12);
        assert!((grid.u2.norm() - V2).abs() < 1e-12);
        assert!((grid.u2.arg() - deg(-37.0)).abs() < 1e-12);
    }

    /// The fixture is a genuine solution of its own network equations: the
    /// assembled Y-bus reproduces the hand-derived branch and shunt currents
    /// at every bus, in both symmetry variants.
    #[test]
    fn test_reference_state_is_a_network_solution() {
        let grid = TestGrid::default();

        let y_bus = grid.y_bus::<Symmetric>();
        let u = vec![grid.u0, grid.u1, grid.u2];
        let i = y_bus.mat_vec(&u);
        assert!((i[0] - grid.branch0_i_f).norm() < 1e-12, "{}", i[0]);
        assert!(
            (i[1] - (grid.branch0_i_t + grid.branch1_i_f)).norm() < 1e-12,
            "{}",
            i[1]
        );
        // the shunt was sized to absorb the branch-1 inflow exactly
        assert!(i[2].norm() < 1e-12, "{}", i[2]);

        let y_bus = grid.y_bus::<Asymmetric>();
        let u = vec![
            Asymmetric::embed(grid.u0),
            Asymmetric::embed(grid.u1),
            Asymmetric::embed(grid.u2),
        ];
        let i = y_bus.mat_vec(&u);
        assert!((i[0] - Asymmetric::embed(grid.branch0_i_f)).norm() < 1e-10);
        assert!((i[1] - Asymmetric::embed(grid.branch0_i_t + grid.branch1_i_f)).norm() < 1e-10);
        assert!(i[2].norm() < 1e-10);
    }

    /// The appliance-side bookkeeping closes: at each bus the source, load
    /// and shunt injections sum to the derived branch flows.
    #[test]
    fn test_reference_injections_balance() {
        let grid = TestGrid::default();
        let s_source = grid.source_inj.conj() * grid.u0;
        assert!(
            (s_source + grid.s0_load_inj - grid.branch0_i_f.conj() * grid.u0).norm() < 1e-12
        );
        assert!(
            (grid.s1_load_inj
                - (grid.branch0_i_t.conj() * grid.u1 + grid.branch1_i_f.conj() * grid.u1))
                .norm()
                < 1e-12
        );
        let s_shunt = -(grid.ys * grid.u2).conj() * grid.u2;
        assert!((s_shunt - grid.branch1_i_t.conj() * grid.u2).norm() < 1e-12);
    }
}
