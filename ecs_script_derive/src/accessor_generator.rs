//! Generate Rhai registrations for script components and events

use crate::script_attributes::ScriptFieldAttribute;
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use syn::Field;

/// Generate the `ScriptComponent` implementation
pub fn generate_component_impl(
    type_name: &Ident,
    script_name: &str,
    fields: &[(&Field, ScriptFieldAttribute)],
) -> TokenStream {
    let exposed: Vec<&Field> = fields
        .iter()
        .filter(|(_, attrs)| !attrs.skip)
        .map(|(field, _)| *field)
        .collect();

    let constructors = (0..=exposed.len())
        .map(|count| generate_constructor(type_name, script_name, &exposed[..count], fields.len()));

    let getters = exposed.iter().map(|field| {
        let field_name = &field.ident;
        let field_name_str = field_name_string(field);
        let ty = &field.ty;
        quote! {
            engine.register_get(
                #field_name_str,
                |component: &mut ecs_script::scripting::ComponentWrapper<#type_name>| {
                    <#ty as ecs_script::ScriptValue>::to_script(&component.read().#field_name)
                },
            );
        }
    });

    let setters = fields
        .iter()
        .filter(|(_, attrs)| !attrs.skip && !attrs.readonly)
        .map(|(field, _)| {
            let field_name = &field.ident;
            let field_name_str = field_name_string(field);
            let ty = &field.ty;
            quote! {
                engine.register_set(
                    #field_name_str,
                    |component: &mut ecs_script::scripting::ComponentWrapper<#type_name>,
                     value: ecs_script::rhai::Dynamic|
                     -> ::core::result::Result<
                        (),
                        ::std::boxed::Box<ecs_script::rhai::EvalAltResult>,
                    > {
                        let value = <#ty as ecs_script::ScriptValue>::from_dynamic(value)
                            .map_err(|e| ::std::format!("{}.{}: {}", #script_name, #field_name_str, e))?;
                        component.write().#field_name = value;
                        ::core::result::Result::Ok(())
                    },
                );
            }
        });

    quote! {
        impl ecs_script::ScriptComponent for #type_name {
            const SCRIPT_NAME: &'static str = #script_name;

            fn register_fields(engine: &mut ecs_script::rhai::Engine) {
                #(#constructors)*
                #(#getters)*
                #(#setters)*
            }
        }
    }
}

/// Constructor taking the first `fields.len()` exposed fields in order
///
/// Everything not passed keeps its `Default` value. Parameters are untyped
/// and converted with `ScriptValue::from_dynamic`, so a mismatch reports the
/// offending field.
fn generate_constructor(
    type_name: &Ident,
    script_name: &str,
    fields: &[&Field],
    total_fields: usize,
) -> TokenStream {
    if fields.is_empty() {
        return quote! {
            engine.register_fn(#script_name, || {
                ecs_script::scripting::ComponentWrapper::new(
                    <#type_name as ::core::default::Default>::default(),
                )
            });
        };
    }

    let params: Vec<Ident> = (0..fields.len())
        .map(|index| Ident::new(&format!("arg{index}"), Span::call_site()))
        .collect();
    let inits = fields.iter().zip(&params).map(|(field, param)| {
        let field_name = &field.ident;
        let field_name_str = field_name_string(field);
        let ty = &field.ty;
        quote! {
            #field_name: <#ty as ecs_script::ScriptValue>::from_dynamic(#param)
                .map_err(|e| ::std::format!("{}.{}: {}", #script_name, #field_name_str, e))?
        }
    });
    let rest = (fields.len() < total_fields)
        .then(|| quote! { ..::core::default::Default::default() });

    quote! {
        engine.register_fn(
            #script_name,
            |#(#params: ecs_script::rhai::Dynamic),*|
             -> ::core::result::Result<
                ecs_script::scripting::ComponentWrapper<#type_name>,
                ::std::boxed::Box<ecs_script::rhai::EvalAltResult>,
            > {
                ::core::result::Result::Ok(ecs_script::scripting::ComponentWrapper::new(#type_name {
                    #(#inits,)*
                    #rest
                }))
            },
        );
    }
}

/// Generate the `ScriptEvent` implementation
pub fn generate_event_impl(
    type_name: &Ident,
    script_name: &str,
    fields: &[(&Field, ScriptFieldAttribute)],
) -> TokenStream {
    let getters = fields
        .iter()
        .filter(|(_, attrs)| !attrs.skip)
        .map(|(field, _)| {
            let field_name = &field.ident;
            let field_name_str = field_name_string(field);
            let ty = &field.ty;
            quote! {
                engine.register_get(#field_name_str, |event: &mut #type_name| {
                    <#ty as ecs_script::ScriptValue>::to_script(&event.#field_name)
                });
            }
        });

    quote! {
        impl ecs_script::ScriptEvent for #type_name {
            const SCRIPT_NAME: &'static str = #script_name;

            fn register_fields(engine: &mut ecs_script::rhai::Engine) {
                #(#getters)*
            }
        }
    }
}

fn field_name_string(field: &Field) -> String {
    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default()
}
