// Copyright (c) 2018-2022 The MobileCoin Foundation

//! `#[test_with_logger]`: turns `fn name(logger: Logger)` into a `#[test]`
//! that builds a per-test logger and runs the body inside a `slog_scope`
//! scope, so the scoped `global_log` macros reach the same logger.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_quote, spanned::Spanned};

#[proc_macro_attribute]
pub fn test_with_logger(_attr: TokenStream, item: TokenStream) -> TokenStream {
    match test_with_logger_impl(item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn test_with_logger_impl(item: TokenStream) -> syn::Result<proc_macro2::TokenStream> {
    let mut original_fn: syn::ItemFn = syn::parse(item).map_err(|err| {
        syn::Error::new(
            err.span(),
            "test_with_logger may only be used on functions",
        )
    })?;

    if original_fn.sig.inputs.len() != 1 {
        return Err(syn::Error::new(
            original_fn.sig.inputs.span(),
            "test_with_logger functions take exactly one argument, the Logger",
        ));
    }

    let orig_ident = original_fn.sig.ident.clone();
    let orig_name = orig_ident.to_string();

    let new_ident = syn::Ident::new(&format!("__wrapped_{orig_name}"), orig_ident.span());
    original_fn.sig.ident = new_ident.clone();

    let mut new_fn: syn::ItemFn = parse_quote! {
        #[test]
        fn #orig_ident() {
            let test_name = format!("{}::{}", module_path!(), #orig_name);
            let logger = mc_common::logger::create_test_logger(test_name);
            mc_common::logger::slog_scope::scope(
                &logger.clone(),
                || {
                    #new_ident(logger);
                }
            );
        }
    };
    // Attributes such as #[should_panic] belong on the generated test.
    new_fn.attrs.append(&mut original_fn.attrs);

    Ok(quote! {
        #new_fn
        #original_fn
    })
}
