use crate::imports::*;

// taken from https://github.com/lumol-org/soa-derive/blob/master/soa-derive-internal/src/input.rs
pub(crate) trait TokenStreamIterator {
    fn concat_by(self, f: impl Fn(TokenStream2, TokenStream2) -> TokenStream2) -> TokenStream2;
    fn concat(self) -> TokenStream2;
}

impl<T: Iterator<Item = TokenStream2>> TokenStreamIterator for T {
    fn concat_by(mut self, f: impl Fn(TokenStream2, TokenStream2) -> TokenStream2) -> TokenStream2 {
        match self.next() {
            Some(first) => self.fold(first, f),
            None => quote! {},
        }
    }

    fn concat(self) -> TokenStream2 {
        self.concat_by(|a, b| quote! { #a #b })
    }
}

/// Returns the named fields of a struct, aborting with a pointed error for
/// enums, unions, and tuple structs.
pub(crate) fn named_fields(ast: &DeriveInput, derive_name: &str) -> Vec<syn::Field> {
    match &ast.data {
        syn::Data::Struct(s) => match &s.fields {
            syn::Fields::Named(named) => named.named.iter().cloned().collect(),
            _ => abort!(
                ast.ident.span(),
                "#[derive({})] requires named fields",
                derive_name
            ),
        },
        _ => abort_call_site!("#[derive({})] only works on structs", derive_name),
    }
}
