//! Derive macros for the fieldless register and config enums used across the workspace

mod enums;

use proc_macro::TokenStream;

/// Adds `pub const ALL: [Self; N]` listing every variant in declaration order.
///
/// Only fieldless enums are supported.
#[proc_macro_derive(EnumAll)]
pub fn enum_all(input: TokenStream) -> TokenStream {
    enums::enum_all(input.into()).into()
}

/// Adds `to_str()`, returning the variant name, and a `Display` impl that writes it.
#[proc_macro_derive(EnumDisplay)]
pub fn enum_display(input: TokenStream) -> TokenStream {
    enums::enum_display(input.into()).into()
}

/// Implements `clap::ValueEnum` in terms of `ALL` and `to_str()`, so the type must also derive
/// [`EnumAll`] and [`EnumDisplay`].
#[proc_macro_derive(CustomValueEnum)]
pub fn custom_value_enum(input: TokenStream) -> TokenStream {
    enums::custom_value_enum(input.into()).into()
}
