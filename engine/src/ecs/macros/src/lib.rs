mod component;
mod tag;

use proc_macro::TokenStream;

/// Derive `rusty_ecs::ecs::Component`.
///
/// Components live in archetype columns unless marked `#[component(sparse)]`, in which case they
/// are kept in the world's sparse store and never cause archetype migration.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}

/// Derive `rusty_ecs::ecs::Tag` for a data-less marker type.
#[proc_macro_derive(Tag)]
pub fn derive_tag(item: TokenStream) -> TokenStream {
    tag::derive_tag(item)
}
