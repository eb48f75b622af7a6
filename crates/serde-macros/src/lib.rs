// Copyright (C) 2023-present The NetGauze Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Derive macros shared by the peerwire wire codecs

use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;

/// Variant of the derived enum together with the type of its single field
#[derive(Debug)]
struct MarkedVariant {
    variant: syn::Ident,
    ty: syn::Type,
}

/// Collect the single-field variants whose field carries the attribute
/// `marker`
fn marked_variants(data: &syn::DataEnum, marker: &str) -> syn::Result<Vec<MarkedVariant>> {
    let mut ret = vec![];
    for variant in &data.variants {
        let marked = variant
            .fields
            .iter()
            .any(|field| field.attrs.iter().any(|attr| attr.path().is_ident(marker)));
        if !marked {
            continue;
        }
        let mut fields = variant.fields.iter();
        match (fields.next(), fields.next()) {
            (Some(field), None) => ret.push(MarkedVariant {
                variant: variant.ident.clone(),
                ty: field.ty.clone(),
            }),
            _ => {
                return Err(syn::Error::new(
                    variant.span(),
                    format!("#[{marker}] is only supported on variants with exactly one field"),
                ))
            }
        }
    }
    Ok(ret)
}

fn expand_writing_error(input: &syn::DeriveInput) -> syn::Result<TokenStream> {
    let syn::Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "WritingError can only be derived for enums",
        ));
    };
    let ident = &input.ident;
    let mut output = TokenStream::new();
    let io_variants = marked_variants(data, "from_std_io_error")?;
    if io_variants.len() > 1 {
        return Err(syn::Error::new(
            input.span(),
            "only one variant can be marked with #[from_std_io_error]",
        ));
    }
    for MarkedVariant { variant, .. } in &io_variants {
        output.extend(quote! {
            #[automatically_derived]
            impl From<std::io::Error> for #ident {
                fn from(err: std::io::Error) -> Self {
                    #ident::#variant(err.to_string())
                }
            }
        });
    }
    for MarkedVariant { variant, ty } in marked_variants(data, "from")? {
        output.extend(quote! {
            #[automatically_derived]
            impl From<#ty> for #ident {
                fn from(err: #ty) -> Self {
                    #ident::#variant(err)
                }
            }
        });
    }
    Ok(output)
}

/// Decorate an error `enum` used while serializing a PDU.
///
/// 1. `#[from_std_io_error]` on a `String` field generates [`From`] for
///    [`std::io::Error`], keeping the error message.
///
/// 2. `#[from]` generates [`From`] for the field type, used to nest the
///    errors of inner PDUs.
///
/// ```no_compile
/// use peerwire_serde_macros::WritingError;
///
/// #[derive(WritingError, PartialEq, Clone, Debug)]
/// pub enum BgpOpenMessageWritingError {
///     StdIOError(#[from_std_io_error] String),
/// }
///
/// #[derive(WritingError, PartialEq, Clone, Debug)]
/// pub enum BgpMessageWritingError {
///     StdIOError(#[from_std_io_error] String),
///     OpenError(#[from] BgpOpenMessageWritingError),
/// }
/// ```
#[proc_macro_derive(WritingError, attributes(from_std_io_error, from))]
pub fn writing_error(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);
    expand_writing_error(&ast)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_writing_error() {
        let input: syn::DeriveInput = syn::parse_quote! {
            pub enum OpenWritingError {
                StdIOError(#[from_std_io_error] String),
                Capability(#[from] crate::CapabilityWritingError),
                Other(u8),
            }
        };
        let expanded: syn::File = syn::parse2(expand_writing_error(&input).unwrap()).unwrap();
        let traits = expanded
            .items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Impl(item) => item.trait_.as_ref().map(|(_, path, _)| path.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        let expected: Vec<syn::Path> = vec![
            syn::parse_quote!(From<std::io::Error>),
            syn::parse_quote!(From<crate::CapabilityWritingError>),
        ];
        assert_eq!(traits, expected);
    }

    #[test]
    fn test_only_enums() {
        let input: syn::DeriveInput = syn::parse_quote! {
            pub struct NotAnEnum(String);
        };
        assert!(expand_writing_error(&input).is_err());
    }

    #[test]
    fn test_marked_variant_with_two_fields() {
        let input: syn::DeriveInput = syn::parse_quote! {
            pub enum Broken {
                Pair(#[from] u8, u16),
            }
        };
        assert!(expand_writing_error(&input).is_err());
    }
}
