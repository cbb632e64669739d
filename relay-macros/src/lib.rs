extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    meta::ParseNestedMeta, parse_macro_input, Expr, ExprArray, FnArg, ImplItem, ItemImpl, LitStr, Pat,
    PatType, Type,
};

/// Turn an `impl` block with `async fn execute(&self, params: P) -> ToolResult`
/// into a declared local tool.
///
/// ```ignore
/// #[tool(name = "get_weather", description = "...", capabilities = [Network])]
/// impl WeatherTool {
///     async fn execute(&self, params: WeatherParams) -> ToolResult { ... }
/// }
/// ```
#[proc_macro_attribute]
pub fn tool(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut attributes = ToolAttributes::default();
    let parser = syn::meta::parser(|meta| attributes.parse(meta));
    parse_macro_input!(args with parser);

    let input = parse_macro_input!(input as ItemImpl);

    match tool_impl(attributes, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ToolAttributes {
    name: Option<LitStr>,
    description: Option<LitStr>,
    capabilities: Vec<Expr>,
}

impl ToolAttributes {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("description") {
            self.description = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("capabilities") {
            let array: ExprArray = meta.value()?.parse()?;
            self.capabilities = array.elems.into_iter().collect();
        } else {
            return Err(meta.error("expected `name`, `description` or `capabilities`"));
        }
        Ok(())
    }
}

fn tool_impl(attributes: ToolAttributes, input: ItemImpl) -> syn::Result<TokenStream2> {
    let name = attributes.name.ok_or_else(|| {
        syn::Error::new_spanned(&input.self_ty, "Missing required 'name' attribute")
    })?;

    let description = attributes.description.ok_or_else(|| {
        syn::Error::new_spanned(&input.self_ty, "Missing required 'description' attribute")
    })?;

    // Use CARGO_PKG_NAME to detect if we're inside relay-core or external
    let pkg_name = std::env::var("CARGO_PKG_NAME").unwrap_or_default();
    let crate_name = if pkg_name == "relay-core" || pkg_name == "relay_core" {
        quote! { crate }
    } else {
        quote! { ::relay_core }
    };

    let self_ty = &input.self_ty;
    let param_type = find_params_type(&input)?;

    let capabilities = attributes
        .capabilities
        .iter()
        .map(|capability| capability_variant(capability, &crate_name))
        .collect::<syn::Result<Vec<_>>>()?;

    let expanded = quote! {
        #input

        impl ::relay_llm::ToolDescription for #self_ty {
            fn name(&self) -> &'static str {
                #name
            }

            fn description(&self) -> &'static str {
                #description
            }

            fn parameters_schema(&self) -> ::serde_json::Value {
                let schema = ::schemars::schema_for!(#param_type);
                ::relay_llm::tool::function_schema(::serde_json::to_value(schema).unwrap_or_default())
            }
        }

        #[::async_trait::async_trait]
        impl #crate_name::tools::Tool for #self_ty {
            type Params = #param_type;

            fn capabilities(&self) -> &'static [#crate_name::tools::ToolCapability] {
                &[#(#capabilities),*]
            }

            async fn execute(&self, params: Self::Params) -> #crate_name::tools::ToolResult {
                <Self>::execute(self, params).await
            }
        }
    };

    Ok(expanded)
}

/// Type of the `params` argument of the inherent `execute` method
fn find_params_type(input: &ItemImpl) -> syn::Result<&Type> {
    let execute = input
        .items
        .iter()
        .find_map(|item| match item {
            ImplItem::Fn(method) if method.sig.ident == "execute" => Some(method),
            _ => None,
        })
        .ok_or_else(|| syn::Error::new_spanned(&input.self_ty, "Expected an 'execute' method"))?;

    execute
        .sig
        .inputs
        .iter()
        .find_map(|arg| match arg {
            FnArg::Typed(PatType { pat, ty, .. }) => match pat.as_ref() {
                Pat::Ident(ident) if ident.ident == "params" => Some(ty.as_ref()),
                _ => None,
            },
            _ => None,
        })
        .ok_or_else(|| {
            syn::Error::new_spanned(&execute.sig, "Expected 'execute' method to have a 'params' parameter")
        })
}

/// `Network` and `ToolCapability::Network` are both accepted
fn capability_variant(capability: &Expr, crate_name: &TokenStream2) -> syn::Result<TokenStream2> {
    let ident = match capability {
        Expr::Path(path) => path.path.segments.last().map(|segment| segment.ident.to_string()),
        _ => None,
    };

    match ident.as_deref() {
        Some("Read") => Ok(quote! { #crate_name::tools::ToolCapability::Read }),
        Some("Write") => Ok(quote! { #crate_name::tools::ToolCapability::Write }),
        Some("Network") => Ok(quote! { #crate_name::tools::ToolCapability::Network }),
        _ => Err(syn::Error::new_spanned(
            capability,
            "unknown capability, expected Read, Write or Network",
        )),
    }
}
