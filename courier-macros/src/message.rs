use crate::derive_utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::spanned::Spanned;
use syn::{Ident, Item, LitStr, Result, Token, Type, parse_macro_input};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Command,
    Event,
}

impl MessageKind {
    fn attr_name(self) -> &'static str {
        match self {
            MessageKind::Command => "#[command]",
            MessageKind::Event => "#[event]",
        }
    }
}

// 宏参数：`key = value` 列表，value 按 key 分别解析为类型或字符串
#[derive(Default)]
struct MessageAttrConfig {
    output: Option<Type>,
    name: Option<LitStr>,
}

impl Parse for MessageAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = MessageAttrConfig::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "output" => {
                    if cfg.output.is_some() {
                        return Err(syn::Error::new(key.span(), "duplicate key 'output'"));
                    }
                    cfg.output = Some(input.parse()?);
                }
                "name" => {
                    if cfg.name.is_some() {
                        return Err(syn::Error::new(key.span(), "duplicate key 'name'"));
                    }
                    cfg.name = Some(input.parse()?);
                }
                _ => {
                    return Err(syn::Error::new(
                        key.span(),
                        "unknown key (supported: 'output', 'name')",
                    ));
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }
        Ok(cfg)
    }
}

pub(crate) fn expand(kind: MessageKind, attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as MessageAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), format!("{} only on struct", kind.attr_name()))
                .to_compile_error()
                .into();
        }
    };

    if kind == MessageKind::Event && cfg.output.is_some() {
        return syn::Error::new(st.span(), "#[event] does not accept 'output'")
            .to_compile_error()
            .into();
    }

    apply_derives(
        &mut st.attrs,
        vec![syn::parse_quote!(Debug), syn::parse_quote!(Clone)],
    );

    let ident = &st.ident;
    let name = cfg
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let message_impl = match kind {
        MessageKind::Command => {
            let output = cfg.output.unwrap_or_else(|| syn::parse_quote! { () });
            quote! {
                impl #impl_generics ::courier_core::message::Command for #ident #ty_generics #where_clause {
                    const NAME: &'static str = #name;
                    type Output = #output;
                }
            }
        }
        MessageKind::Event => quote! {
            impl #impl_generics ::courier_core::message::Event for #ident #ty_generics #where_clause {
                const NAME: &'static str = #name;
            }
        },
    };

    TokenStream::from(quote! {
        #st
        #message_impl
    })
}
