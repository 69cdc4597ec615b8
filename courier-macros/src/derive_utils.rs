use quote::ToTokens;
use syn::{Attribute, Token};

// 提取非 derive 属性与已有 derive 列表
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("derive") {
            if let Ok(list) = attr.parse_args_with(
                syn::punctuated::Punctuated::<syn::Path, Token![,]>::parse_terminated,
            ) {
                existing.extend(list);
            }
        } else {
            retained.push(attr.clone());
        }
    }
    (retained, existing)
}

// 按末段名去重：`Clone` 与 `std::clone::Clone` 视为同一派生
fn derive_key(p: &syn::Path) -> String {
    match p.segments.last() {
        Some(last) => last.ident.to_string(),
        None => p.to_token_stream().to_string(),
    }
}

// 合并默认派生到 attrs 最前，保留其余属性顺序
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);
    let mut seen = std::collections::HashSet::<String>::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();
    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}
