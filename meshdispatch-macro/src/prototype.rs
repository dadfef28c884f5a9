use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, Ident, LitStr, Type};

pub fn derive_prototype(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_prototype_impl(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(error) => TokenStream::from(error.to_compile_error()),
    }
}

enum Source {
    Context,
    Path(LitStr),
    Query(LitStr),
    Header(LitStr),
    Attribute(LitStr),
    Body,
}

/// One injection point parsed from a struct field.
struct InjectionPoint {
    ident: Ident,
    value_type: Type,
    arc: bool,
    optional: bool,
    source: Source,
    default: Option<LitStr>,
    is_field: bool,
}

impl InjectionPoint {
    fn parse(field: &Field) -> syn::Result<Self> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "#[derive(Prototype)] needs named fields"))?;

        let (optional, ty) = match generic_argument(&field.ty, "Option") {
            Some(inner) => (true, inner),
            None => (false, field.ty.clone()),
        };
        let (arc, value_type) = match generic_argument(&ty, "Arc") {
            Some(inner) => (true, inner),
            None => (false, ty),
        };

        let mut point = InjectionPoint {
            ident,
            value_type,
            arc,
            optional,
            source: Source::Context,
            default: None,
            is_field: false,
        };

        for attr in &field.attrs {
            if attr.path().is_ident("field") {
                point.is_field = true;
            } else if attr.path().is_ident("inject") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("body") {
                        point.source = Source::Body;
                        return Ok(());
                    }
                    let value: LitStr = meta.value()?.parse()?;
                    if meta.path.is_ident("path") {
                        point.source = Source::Path(value);
                    } else if meta.path.is_ident("query") {
                        point.source = Source::Query(value);
                    } else if meta.path.is_ident("header") {
                        point.source = Source::Header(value);
                    } else if meta.path.is_ident("attribute") {
                        point.source = Source::Attribute(value);
                    } else if meta.path.is_ident("default") {
                        point.default = Some(value);
                    } else {
                        return Err(meta.error("expected one of: path, query, header, attribute, body, default"));
                    }
                    Ok(())
                })?;
            }
        }
        Ok(point)
    }

    fn name(&self) -> String {
        self.ident.to_string()
    }

    /// The `MethodParameter` describing this injection point.
    fn parameter(&self) -> TokenStream2 {
        let ty = &self.value_type;
        let name = self.name();
        let parameter = quote!(::meshdispatch::method::MethodParameter);
        let base = match &self.source {
            Source::Context => quote!(#parameter::context::<#ty>(#name)),
            Source::Path(key) => quote!(#parameter::path::<#ty>(#key)),
            Source::Query(key) => quote!(#parameter::query::<#ty>(#key)),
            Source::Header(key) => quote!(#parameter::header::<#ty>(#key)),
            Source::Attribute(key) => quote!(#parameter::attribute::<#ty>(#key)),
            Source::Body => quote!(#parameter::body::<#ty>(#name)),
        };
        let optional = self.optional.then(|| quote!(.optional()));
        let default = self.default.as_ref().map(|value| quote!(.default_value(#value)));
        quote!(#base #optional #default)
    }

    /// Converts the resolved `arg` expression into the field's value.
    fn value(&self, arg: TokenStream2) -> TokenStream2 {
        let ty = &self.value_type;
        let name = self.name();
        let helper = match (self.optional, self.arc) {
            (false, true) => quote!(required_arc),
            (false, false) => quote!(required_cloned),
            (true, true) => quote!(optional_arc),
            (true, false) => quote!(optional_cloned),
        };
        quote!(::meshdispatch::arg::#helper::<#ty>(#arg, #name)?)
    }
}

fn generate_prototype_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unit => {
                return Ok(quote! {
                    impl #impl_generics ::meshdispatch::bean::Prototype for #struct_name #ty_generics #where_clause {
                        fn descriptor() -> ::meshdispatch::bean::BeanDescriptor {
                            ::meshdispatch::bean::BeanDescriptor::builder::<Self>()
                                .constructor(::std::vec::Vec::new(), |_| Ok(#struct_name))
                                .build()
                        }
                    }
                });
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "#[derive(Prototype)] only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Prototype)] can only be applied to structs",
            ))
        }
    };

    let points = fields
        .iter()
        .map(InjectionPoint::parse)
        .collect::<syn::Result<Vec<_>>>()?;
    let (injected, constructed): (Vec<&InjectionPoint>, Vec<&InjectionPoint>) =
        points.iter().partition(|point| point.is_field);

    let constructor_params = constructed.iter().map(|point| point.parameter());
    let initializers = points.iter().map(|point| {
        let ident = &point.ident;
        if point.is_field {
            quote!(#ident: ::core::default::Default::default())
        } else {
            let value = point.value(quote!(args.next().flatten()));
            quote!(#ident: #value)
        }
    });

    let field_injections = injected.iter().map(|point| {
        let ident = &point.ident;
        let parameter = point.parameter();
        let value = point.value(quote!(arg));
        quote! {
            .field(#parameter, |bean: &mut Self, arg: ::meshdispatch::arg::Arg| {
                bean.#ident = #value;
                Ok(())
            })
        }
    });

    Ok(quote! {
        impl #impl_generics ::meshdispatch::bean::Prototype for #struct_name #ty_generics #where_clause {
            fn descriptor() -> ::meshdispatch::bean::BeanDescriptor {
                ::meshdispatch::bean::BeanDescriptor::builder::<Self>()
                    .constructor(
                        ::std::vec![#(#constructor_params),*],
                        |args: ::meshdispatch::arg::Args| {
                            #[allow(unused_mut, unused_variables)]
                            let mut args = args.into_vec().into_iter();
                            Ok(Self {
                                #(#initializers),*
                            })
                        },
                    )
                    #(#field_injections)*
                    .build()
            }
        }
    })
}

/// The single type argument of `Wrapper<T>`, e.g. the `T` of an `Arc<T>`.
fn generic_argument(ty: &Type, wrapper: &str) -> Option<Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == wrapper {
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(syn::GenericArgument::Type(inner_type)) = args.args.first() {
                        return Some(inner_type.clone());
                    }
                }
            }
        }
    }
    None
}
