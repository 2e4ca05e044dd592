use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

/// Derives `OptBundle` for a struct of components.
///
/// Every field is moved into the deferred builder; `Option<T>` fields (under
/// any of the usual spellings of the path) are inserted only when they are
/// `Some`, so one record-shaped struct can attach components conditionally
/// (missing record ids, out-of-service markers, tap data).
#[proc_macro_derive(OptBundle)]
pub fn derive_opt_bundle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "OptBundle can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "OptBundle can only be derived for structs with named fields",
        ));
    };

    let inserts = fields.named.iter().map(|field| {
        let name = field.ident.as_ref().expect("named field");
        if is_option(&field.ty) {
            quote! {
                if let Some(component) = self.#name {
                    builder.insert(component);
                }
            }
        } else {
            quote! {
                builder.insert(self.#name);
            }
        }
    });

    let ident = &input.ident;
    Ok(quote! {
        impl OptBundle for #ident {
            fn insert_to(self, builder: &mut DeferredBundleBuilder) {
                #(#inserts)*
            }
        }
    })
}

/// Recognises `Option<T>` whether written bare or with its qualified path.
fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else { return false };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }
    if !matches!(&last.arguments, PathArguments::AngleBracketed(args)
        if args.args.iter().any(|a| matches!(a, GenericArgument::Type(_))))
    {
        return false;
    }
    let spelled: Vec<String> = path
        .path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect();
    matches!(
        spelled.join("::").as_str(),
        "Option" | "option::Option" | "std::option::Option" | "core::option::Option"
    )
}
