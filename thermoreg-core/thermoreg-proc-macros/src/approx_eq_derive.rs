use crate::imports::*;
use crate::utilities::*;

pub fn approx_eq_derive(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);
    let name = &ast.ident;
    let field_names = named_fields(&ast, "ApproxEq")
        .into_iter()
        .filter_map(|f| f.ident)
        .collect::<Vec<_>>();

    let mut generated = TokenStream2::new();
    generated.append_all(quote! {
        impl ApproxEq for #name {
            fn approx_eq(&self, other: &#name, tol: f64) -> bool {
                true #(&& self.#field_names.approx_eq(&other.#field_names, tol))*
            }
        }
    });
    generated.into()
}
