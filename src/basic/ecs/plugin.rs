//! Model plugin: default configuration resources for a grid world.

use bevy_app::prelude::*;

use super::network::CalcOptions;
use super::update::DirtyFlags;

/// Installs the calculation configuration and the invalidation flags.
pub struct GridModelPlugin;

impl Plugin for GridModelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(CalcOptions::default());
        app.insert_resource(DirtyFlags::default());
    }
}

/// A bare application with the grid plugin installed.
pub fn default_app() -> App {
    let mut app = App::new();
    app.add_plugins(GridModelPlugin);
    app
}
