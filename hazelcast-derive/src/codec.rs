//! Derive macro implementation for `HazelcastCodec`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, Type};

struct CodecField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
}

pub fn derive_codec_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "HazelcastCodec only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "HazelcastCodec can only be derived for structs",
            ))
        }
    };

    let mut fixed = Vec::new();
    let mut var = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let codec_field = CodecField {
            ident,
            ty: &field.ty,
        };
        if has_flag(&field.attrs, "fixed")? {
            fixed.push(codec_field);
        } else {
            var.push(codec_field);
        }
    }

    let all_idents: Vec<_> = fixed.iter().chain(var.iter()).map(|f| f.ident).collect();
    let encode_var: Vec<_> = var
        .iter()
        .map(|f| {
            let ident = f.ident;
            quote! { hazelcast_core::protocol::FrameCodec::encode_frames(&self.#ident, message); }
        })
        .collect();
    let decode_var: Vec<_> = var
        .iter()
        .map(|f| {
            let (ident, ty) = (f.ident, f.ty);
            quote! {
                let #ident = <#ty as hazelcast_core::protocol::FrameCodec>::decode_frames(frames)?;
            }
        })
        .collect();
    let decode_fixed = fixed_decoder(&fixed);
    let read_initial = quote! { let initial = frames.next_frame()?; };

    if has_flag(&input.attrs, "data_structure")? {
        let read_fixed_frame = if fixed.is_empty() {
            quote! {}
        } else {
            read_initial
        };
        let encode_fixed = if fixed.is_empty() {
            quote! {}
        } else {
            let sizes = fixed.iter().map(|f| {
                let ty = f.ty;
                quote! { + <#ty as hazelcast_core::protocol::FixedSizeCodec>::SIZE }
            });
            let writes = fixed_writers(&fixed, quote! { &mut initial });
            quote! {
                let mut initial = hazelcast_core::bytes::BytesMut::with_capacity(0 #(#sizes)*);
                #(#writes)*
                message.add_frame(hazelcast_core::protocol::Frame::with_content(initial));
            }
        };

        return Ok(quote! {
            impl #impl_generics hazelcast_core::protocol::FrameCodec
                for #name #ty_generics #where_clause
            {
                fn encode_frames(&self, message: &mut hazelcast_core::protocol::ClientMessage) {
                    message.add_frame(
                        hazelcast_core::protocol::Frame::new_begin_data_structure_frame(),
                    );
                    #encode_fixed
                    #(#encode_var)*
                    message.add_frame(
                        hazelcast_core::protocol::Frame::new_end_data_structure_frame(),
                    );
                }

                #[allow(unused_assignments, unused_mut, unused_variables)]
                fn decode_frames(
                    frames: &mut hazelcast_core::protocol::ForwardFrameIterator<'_>,
                ) -> hazelcast_core::Result<Self> {
                    frames.expect_begin_data_structure()?;
                    let mut offset = 0usize;
                    #read_fixed_frame
                    #decode_fixed
                    #(#decode_var)*
                    frames.fast_forward_to_end_frame()?;
                    Ok(Self { #(#all_idents),* })
                }
            }
        });
    }

    let encode_fixed = if fixed.is_empty() {
        quote! {}
    } else {
        let writes = fixed_writers(&fixed, quote! { initial });
        quote! {
            {
                let initial = message.initial_frame_content_mut();
                #(#writes)*
            }
        }
    };

    Ok(quote! {
        impl #impl_generics hazelcast_core::protocol::MessageCodec
            for #name #ty_generics #where_clause
        {
            fn encode_fields(&self, message: &mut hazelcast_core::protocol::ClientMessage) {
                #encode_fixed
                #(#encode_var)*
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn decode_fields(
                message: &hazelcast_core::protocol::ClientMessage,
                header_size: usize,
            ) -> hazelcast_core::Result<Self> {
                let mut iter = message.frame_iter();
                let frames = &mut iter;
                let mut offset = header_size;
                #read_initial
                #decode_fixed
                #(#decode_var)*
                Ok(Self { #(#all_idents),* })
            }
        }
    })
}

/// Reads every fixed field from `initial`, advancing `offset`.
fn fixed_decoder(fixed: &[CodecField<'_>]) -> TokenStream2 {
    let reads = fixed.iter().map(|f| {
        let (ident, ty) = (f.ident, f.ty);
        quote! {
            let #ident = <#ty as hazelcast_core::protocol::FixedSizeCodec>::decode_fixed(
                &initial.content,
                offset,
            )?;
            offset += <#ty as hazelcast_core::protocol::FixedSizeCodec>::SIZE;
        }
    });
    quote! { #(#reads)* }
}

fn fixed_writers<'a>(
    fixed: &'a [CodecField<'a>],
    target: TokenStream2,
) -> impl Iterator<Item = TokenStream2> + 'a {
    fixed.iter().map(move |f| {
        let ident = f.ident;
        quote! {
            hazelcast_core::protocol::FixedSizeCodec::encode_fixed(&self.#ident, #target);
        }
    })
}

fn has_flag(attrs: &[syn::Attribute], key: &str) -> syn::Result<bool> {
    let mut found = false;
    for attr in attrs {
        if !attr.path().is_ident("hazelcast") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                found = true;
            }
            Ok(())
        })?;
    }
    Ok(found)
}
