use crate::imports::*;
use crate::utilities::*;

pub fn history_vec_derive(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);
    let original_name = &ast.ident;
    let new_name = Ident::new(
        &format!("{}HistoryVec", original_name.to_token_stream()),
        original_name.span(),
    );
    let fields = named_fields(&ast, "HistoryVec");
    if fields.is_empty() {
        abort!(original_name.span(), "HistoryVec needs at least one field");
    }
    let field_names = fields
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .collect::<Vec<_>>();
    let first_field = field_names[0];

    let vec_fields = fields
        .iter()
        .map(|f| {
            let ident = f.ident.as_ref();
            let ty = &f.ty;
            quote! {
                pub #ident: Vec<#ty>,
            }
        })
        .concat();

    let doc = format!(
        "Time history of [{}], one vector entry per recorded snapshot.",
        original_name
    );

    let mut generated = TokenStream2::new();
    generated.append_all(quote! {
        #[doc = #doc]
        #[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
        pub struct #new_name {
            #vec_fields
        }

        impl #new_name {
            pub fn new() -> #new_name {
                Self::default()
            }

            /// push fields of a snapshot onto the history vecs
            pub fn push(&mut self, value: #original_name) {
                #(self.#field_names.push(value.#field_names);)*
            }

            /// clear all history vecs
            pub fn clear(&mut self) {
                #(self.#field_names.clear();)*
            }

            /// remove and return the most recent snapshot
            pub fn pop(&mut self) -> Option<#original_name> {
                if self.is_empty() {
                    return None;
                }
                #(
                    let #field_names = self.#field_names.pop()?;
                )*
                Some(#original_name { #(#field_names),* })
            }

            pub fn len(&self) -> usize {
                self.#first_field.len()
            }

            pub fn is_empty(&self) -> bool {
                self.#first_field.is_empty()
            }
        }
    });
    generated.into()
}
