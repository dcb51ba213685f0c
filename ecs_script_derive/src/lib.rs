mod accessor_generator;
mod script_attributes;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for the ScriptComponent trait
///
/// Registers a shared component class named after the struct (or
/// `#[script(name = "...")]`) with a constructor for every prefix of its
/// fields and a getter/setter per field. Fields marked `#[script(skip)]` are
/// hidden and `#[script(readonly)]` fields get no setter.
#[proc_macro_derive(ScriptComponent, attributes(script))]
pub fn derive_script_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input, accessor_generator::generate_component_impl)
}

/// Derive macro for the ScriptEvent trait
///
/// Registers the event payload type with read-only field getters.
#[proc_macro_derive(ScriptEvent, attributes(script))]
pub fn derive_script_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input, accessor_generator::generate_event_impl)
}

fn expand(
    input: &DeriveInput,
    generate: fn(
        &syn::Ident,
        &str,
        &[(&syn::Field, script_attributes::ScriptFieldAttribute)],
    ) -> proc_macro2::TokenStream,
) -> TokenStream {
    let result = script_attributes::parse_type_attributes(&input.attrs).and_then(|attrs| {
        let fields = script_attributes::struct_fields(input)?;
        let script_name = attrs.name.unwrap_or_else(|| input.ident.to_string());
        Ok(generate(&input.ident, &script_name, &fields))
    });

    match result {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}
