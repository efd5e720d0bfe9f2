use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let mut sparse = false;
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("component")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("sparse") {
                sparse = true;
                Ok(())
            } else {
                Err(meta.error("unsupported component attribute, expected `sparse`"))
            }
        });
        if let Err(err) = parsed {
            return err.to_compile_error().into();
        }
    }

    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    // `::rusty_ecs` resolves inside the crate through `extern crate self as rusty_ecs;` in lib.rs.
    let storage = if sparse {
        quote! {
            const STORAGE: ::rusty_ecs::ecs::component::StorageKind =
                ::rusty_ecs::ecs::component::StorageKind::Sparse;
        }
    } else {
        quote! {}
    };

    TokenStream::from(quote! {
        impl #impl_generics ::rusty_ecs::ecs::Component for #struct_name #ty_generics #where_clause {
            #storage
        }
    })
}
