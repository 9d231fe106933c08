//! Derive macro for `InnerSerialize`, the legacy Keymaster message encoding.
use proc_macro2::TokenStream;
use quote::{format_ident, quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Data, DeriveInput, Fields, GenericParam,
    Generics, Index,
};

/// Derive macro that implements the `InnerSerialize` trait. Using this macro requires
/// that `InnerSerialize`, `Error` and `Vec` are locally `use`d.
///
/// Structs encode their fields in declaration order with no framing. Fieldless enums
/// encode as a `u32` holding the discriminant, and also need `#[derive(N)]` from `enumn`.
#[proc_macro_derive(LegacySerialize)]
pub fn derive_legacy_serialize(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_legacy_serialize_internal(&input)
}

fn derive_legacy_serialize_internal(input: &DeriveInput) -> proc_macro::TokenStream {
    let name = &input.ident;

    let generics = add_trait_bounds(&input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let deserialize = deserialize_body(&input.data);
    let serialize = serialize_body(&input.data);

    let expanded = quote! {
        impl #impl_generics InnerSerialize for #name #ty_generics #where_clause {
            fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
                #deserialize
            }
            fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                #serialize
            }
        }
    };

    expanded.into()
}

/// Add a bound `T: InnerSerialize` for every type parameter `T`.
fn add_trait_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param.bounds.push(parse_quote!(InnerSerialize));
        }
    }
    generics
}

/// Generate the body of `serialize_into`.
fn serialize_body(data: &Data) -> TokenStream {
    match *data {
        Data::Struct(ref data) => {
            // Expands to a sequence like
            //
            //     InnerSerialize::serialize_into(&self.x, buf)?;
            //     InnerSerialize::serialize_into(&self.y, buf)?;
            //     Ok(())
            let recurse: Vec<TokenStream> = match data.fields {
                Fields::Named(ref fields) => fields
                    .named
                    .iter()
                    .map(|f| {
                        let name = &f.ident;
                        quote_spanned! {f.span()=>
                            InnerSerialize::serialize_into(&self.#name, buf)?;
                        }
                    })
                    .collect(),
                Fields::Unnamed(ref fields) => fields
                    .unnamed
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        let index = Index::from(i);
                        quote_spanned! {f.span()=>
                            InnerSerialize::serialize_into(&self.#index, buf)?;
                        }
                    })
                    .collect(),
                Fields::Unit => Vec::new(),
            };
            quote! {
                #(#recurse)*
                Ok(())
            }
        }
        Data::Enum(_) => {
            quote! {
                InnerSerialize::serialize_into(&((*self as i32) as u32), buf)
            }
        }
        Data::Union(_) => unimplemented!(),
    }
}

/// Generate the body of `deserialize`.
fn deserialize_body(data: &Data) -> TokenStream {
    match *data {
        Data::Struct(ref data) => match data.fields {
            Fields::Named(ref fields) => {
                // Expands to
                //
                //     let (x, data) = <XType>::deserialize(data)?;
                //     let (y, data) = <YType>::deserialize(data)?;
                //     Ok((Self { x, y }, data))
                let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                let steps = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    let typ = &f.ty;
                    quote_spanned! {f.span()=>
                        let (#name, data) = <#typ as InnerSerialize>::deserialize(data)?;
                    }
                });
                quote! {
                    #(#steps)*
                    Ok((Self { #(#names, )* }, data))
                }
            }
            Fields::Unnamed(ref fields) => {
                let vars: Vec<_> =
                    (0..fields.unnamed.len()).map(|i| format_ident!("field{}", i)).collect();
                let steps = fields.unnamed.iter().zip(vars.iter()).map(|(f, var)| {
                    let typ = &f.ty;
                    quote_spanned! {f.span()=>
                        let (#var, data) = <#typ as InnerSerialize>::deserialize(data)?;
                    }
                });
                quote! {
                    #(#steps)*
                    Ok((Self( #(#vars, )* ), data))
                }
            }
            Fields::Unit => quote! { Ok((Self, data)) },
        },
        Data::Enum(_) => {
            quote! {
                let (v, data) = <u32 as InnerSerialize>::deserialize(data)?;
                match Self::n(v as i32) {
                    Some(e) => Ok((e, data)),
                    None => Err(Error::InvalidEnumValue(v)),
                }
            }
        }
        Data::Union(_) => unimplemented!(),
    }
}
