use proc_macro::TokenStream;

mod prototype;

/// Derive macro for per-request (prototype) beans
///
/// Every field not marked `#[field]` is a constructor parameter, in
/// declaration order. Fields marked `#[field]` start from `Default` and are
/// injected after construction.
///
/// A parameter comes from the deployment container unless `#[inject(...)]`
/// names another source: `path = "id"`, `query = "page"`, `header = "x-tenant"`,
/// `attribute = "user"` or `body`. `default = "..."` supplies a fallback for
/// absent request values. `Arc<T>` fields receive the resolved `Arc`,
/// `Option<T>` fields are optional, anything else is cloned out.
///
/// # Example
/// ```ignore
/// use meshdispatch::prelude::*;
///
/// #[derive(Prototype)]
/// pub struct ReportController {
///     clock: Arc<Clock>,
///     #[inject(query = "format", default = "json")]
///     format: String,
///     #[field]
///     #[inject(header = "x-tenant")]
///     tenant: Option<String>,
/// }
/// ```
#[proc_macro_derive(Prototype, attributes(inject, field))]
pub fn derive_prototype(input: TokenStream) -> TokenStream {
    prototype::derive_prototype(input)
}
