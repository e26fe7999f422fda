use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident};

fn parse_fieldless_enum(input: TokenStream, macro_name: &str) -> (DeriveInput, Vec<Ident>) {
    let ast: DeriveInput = syn::parse2(input).expect("unable to parse derive input");

    let name = &ast.ident;
    let Data::Enum(data) = &ast.data else {
        panic!("{macro_name} can only be derived for enums; {name} is not an enum");
    };

    let variants = data
        .variants
        .iter()
        .map(|variant| {
            let variant_name = &variant.ident;
            assert!(
                matches!(variant.fields, Fields::Unit),
                "{macro_name} requires fieldless variants; {name}::{variant_name} has fields"
            );
            variant_name.clone()
        })
        .collect();

    (ast, variants)
}

pub fn enum_all(input: TokenStream) -> TokenStream {
    let (ast, variants) = parse_fieldless_enum(input, "EnumAll");

    let name = &ast.ident;
    let len = variants.len();

    quote! {
        impl #name {
            pub const ALL: [Self; #len] = [#(Self::#variants,)*];
        }
    }
}

pub fn enum_display(input: TokenStream) -> TokenStream {
    let (ast, variants) = parse_fieldless_enum(input, "EnumDisplay");

    let name = &ast.ident;
    let variant_strs = variants.iter().map(Ident::to_string);

    quote! {
        impl #name {
            #[must_use]
            pub fn to_str(&self) -> &'static str {
                match self {
                    #(Self::#variants => #variant_strs,)*
                }
            }
        }

        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.to_str())
            }
        }
    }
}

pub fn custom_value_enum(input: TokenStream) -> TokenStream {
    let ast: DeriveInput = syn::parse2(input).expect("unable to parse derive input");
    let name = &ast.ident;

    quote! {
        impl ::clap::ValueEnum for #name {
            fn value_variants<'a>() -> &'a [Self] {
                &Self::ALL
            }

            fn to_possible_value(&self) -> ::std::option::Option<::clap::builder::PossibleValue> {
                ::std::option::Option::Some(::clap::builder::PossibleValue::new(self.to_str()))
            }
        }
    }
}
