//! Attribute parsing for the script derive macros

use syn::{Attribute, Data, DeriveInput, Field, Fields, LitStr};

/// Parsed `#[script(...)]` attributes on the type
#[derive(Debug, Default, Clone)]
pub struct ScriptTypeAttribute {
    /// Class name seen by scripts
    pub name: Option<String>,
}

/// Parsed `#[script(...)]` attributes on a field
#[derive(Debug, Default, Clone)]
pub struct ScriptFieldAttribute {
    /// Not visible to scripts at all
    pub skip: bool,
    /// Getter only
    pub readonly: bool,
}

/// Parse type-level attributes
pub fn parse_type_attributes(attrs: &[Attribute]) -> syn::Result<ScriptTypeAttribute> {
    let mut parsed = ScriptTypeAttribute::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("script")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                if !is_identifier(&lit.value()) {
                    return Err(syn::Error::new_spanned(
                        &lit,
                        "script name must be a plain identifier",
                    ));
                }
                parsed.name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown script attribute, expected `name = \"...\"`"))
            }
        })?;
    }

    Ok(parsed)
}

/// Parse field-level attributes
pub fn parse_field_attributes(field: &Field) -> syn::Result<ScriptFieldAttribute> {
    let mut parsed = ScriptFieldAttribute::default();

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("script")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else if meta.path.is_ident("readonly") {
                parsed.readonly = true;
            } else {
                return Err(meta.error("unknown script attribute, expected `skip` or `readonly`"));
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}

/// Named fields of a non-generic struct, with their attributes
///
/// Unit structs have no fields. Enums, unions, tuple structs and generic
/// types are rejected.
pub fn struct_fields(input: &DeriveInput) -> syn::Result<Vec<(&Field, ScriptFieldAttribute)>> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "script types cannot be generic",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "script types must be structs",
            ))
        }
    };

    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|field| Ok((field, parse_field_attributes(field)?)))
            .collect(),
        Fields::Unit => Ok(Vec::new()),
        Fields::Unnamed(_) => Err(syn::Error::new_spanned(
            fields,
            "script types must use named fields",
        )),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
