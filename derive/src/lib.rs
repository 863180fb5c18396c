extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DataEnum, DeriveInput, Fields,
    GenericParam, Generics, Ident, Type,
};

/// Container attributes parsed from `#[bstream(...)]` on a struct or enum.
#[derive(Debug, Default)]
struct ContainerAttributes {
    as_map: bool,
}

/// Field attributes parsed from `#[bstream(...)]`.
///
/// * `base` - the field is a parent aggregate whose fields are inlined
/// * `with` - module providing `encode(&T, &mut OutputStream)` and `decode(&mut InputStream)`
#[derive(Debug, Default)]
struct FieldAttributes {
    base: bool,
    with: Option<syn::Path>,
}

fn get_container_attributes(attrs: &[Attribute]) -> syn::Result<ContainerAttributes> {
    let mut parsed = ContainerAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("bstream") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("as_map") {
                parsed.as_map = true;
                Ok(())
            } else {
                Err(meta.error("unknown bstream container attribute"))
            }
        })?;
    }
    Ok(parsed)
}

/// Parses `#[bstream(base)]` and `#[bstream(with = "path")]`.
fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("bstream") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("base") {
                parsed.base = true;
                Ok(())
            } else if meta.path.is_ident("with") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                parsed.with = Some(lit.parse()?);
                Ok(())
            } else {
                Err(meta.error("unknown bstream field attribute"))
            }
        })?;
        if parsed.base && parsed.with.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "`base` and `with` cannot be combined",
            ));
        }
    }
    Ok(parsed)
}

/// One field of a struct or enum variant with its parsed attributes.
struct FieldInfo {
    /// Accessor: `self.name`/`self.0` for structs, a binding for variants.
    member: TokenStream2,
    /// Binding or struct member name.
    ident: Option<Ident>,
    ty: Type,
    attrs: FieldAttributes,
}

fn collect_fields(fields: &Fields, prefix: Option<&str>) -> syn::Result<Vec<FieldInfo>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let attrs = get_field_attributes(&f.attrs)?;
            let member = match (&f.ident, prefix) {
                (Some(ident), None) => quote! { self.#ident },
                (None, None) => {
                    let index = syn::Index::from(i);
                    quote! { self.#index }
                }
                (_, Some(prefix)) => {
                    let binding = Ident::new(&format!("{}{}", prefix, i), Span::call_site());
                    quote! { #binding }
                }
            };
            Ok(FieldInfo {
                member,
                ident: f.ident.clone(),
                ty: f.ty.clone(),
                attrs,
            })
        })
        .collect()
}

/// Wire element count contributed by a field.
fn field_count(field: &FieldInfo) -> TokenStream2 {
    let ty = &field.ty;
    if field.attrs.base {
        quote! { <#ty as bstream::EncodeFields>::FIELD_COUNT }
    } else {
        quote! { 1usize }
    }
}

fn decode_field_count(field: &FieldInfo) -> TokenStream2 {
    let ty = &field.ty;
    if field.attrs.base {
        quote! { <#ty as bstream::DecodeFields>::FIELD_COUNT }
    } else {
        quote! { 1usize }
    }
}

/// Statement writing one field. `value` evaluates to a reference to the field.
fn encode_field(field: &FieldInfo, value: TokenStream2) -> TokenStream2 {
    if field.attrs.base {
        quote! { bstream::EncodeFields::encode_fields(#value, os)?; }
    } else if let Some(path) = &field.attrs.with {
        quote! { #path::encode(#value, os)?; }
    } else {
        quote! { bstream::Encoder::encode(#value, os)?; }
    }
}

/// Expression reading one field.
fn decode_field(field: &FieldInfo) -> TokenStream2 {
    let ty = &field.ty;
    if field.attrs.base {
        quote! { <#ty as bstream::DecodeFields>::decode_fields(is)? }
    } else if let Some(path) = &field.attrs.with {
        quote! { #path::decode(is)? }
    } else {
        quote! { <#ty as bstream::Decoder>::decode(is)? }
    }
}

fn reject_base(fields: &[FieldInfo], context: &str, span: Span) -> syn::Result<()> {
    if fields.iter().any(|f| f.attrs.base) {
        return Err(syn::Error::new(
            span,
            format!("`#[bstream(base)]` is not supported {}", context),
        ));
    }
    Ok(())
}

/// Builds `Name { a: .., b: .. }`, `Name(.., ..)` or `Name` from per-field expressions.
fn construct(path: TokenStream2, fields: &Fields, values: Vec<TokenStream2>) -> TokenStream2 {
    match fields {
        Fields::Named(named) => {
            let idents = named.named.iter().map(|f| &f.ident);
            quote! { #path { #(#idents: #values),* } }
        }
        Fields::Unnamed(_) => quote! { #path( #(#values),* ) },
        Fields::Unit => quote! { #path },
    }
}

/// Pattern binding every field of a variant to `field0`, `field1`, ...
fn variant_pattern(path: TokenStream2, fields: &Fields) -> TokenStream2 {
    let bindings = (0..fields.len()).map(|i| format_ident!("field{}", i));
    match fields {
        Fields::Named(named) => {
            let idents = named.named.iter().map(|f| &f.ident);
            quote! { #path { #(#idents: #bindings),* } }
        }
        Fields::Unnamed(_) => quote! { #path( #(#bindings),* ) },
        Fields::Unit => quote! { #path },
    }
}

/// Requires `bound` of every type parameter.
/// Name as written on the wire, without any `r#` prefix.
fn wire_name(ident: &Ident) -> String {
    ident.unraw().to_string()
}

fn add_trait_bounds(mut generics: Generics, bound: TokenStream2) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(type_param) = param {
            type_param.bounds.push(syn::parse_quote!(#bound));
        }
    }
    generics
}

fn is_fieldless(data: &DataEnum) -> bool {
    data.variants
        .iter()
        .all(|v| matches!(v.fields, Fields::Unit))
}

/// Derive macro for implementing the `Encoder` trait
///
/// Structs are written as an array of their fields in declaration order, or
/// as a map of field name to value with `#[bstream(as_map)]`. Enums without
/// fields are written as their discriminant; other enums as
/// `[variant_index, fields...]`.
///
/// # Supported Attributes
///
/// * `#[bstream(as_map)]` - On a struct with named fields: map framing
/// * `#[bstream(base)]` - On a field: inline the field's own fields
/// * `#[bstream(with = "path")]` - On a field: encode with `path::encode`
///
/// # Examples
///
/// ```ignore
/// #[derive(Encode)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
/// ```
#[proc_macro_derive(Encode, attributes(bstream))]
pub fn derive_encode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_encode(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_encode(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let generics = add_trait_bounds(input.generics.clone(), quote! { bstream::Encoder });
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let container = get_container_attributes(&input.attrs)?;

    match &input.data {
        Data::Struct(s) => {
            let fields = collect_fields(&s.fields, None)?;
            let counts = fields.iter().map(field_count);
            let field_encode = fields.iter().map(|f| {
                let member = &f.member;
                encode_field(f, quote! { &#member })
            });
            let field_list = quote! {
                impl #impl_generics bstream::EncodeFields for #name #ty_generics #where_clause {
                    const FIELD_COUNT: usize = 0usize #(+ #counts)*;

                    #[allow(unused_variables)]
                    fn encode_fields(&self, os: &mut bstream::OutputStream) -> bstream::Result<()> {
                        #(#field_encode)*
                        Ok(())
                    }
                }
            };

            let body = if container.as_map {
                if !matches!(s.fields, Fields::Named(_)) {
                    return Err(syn::Error::new(
                        name.span(),
                        "`#[bstream(as_map)]` requires named fields",
                    ));
                }
                reject_base(&fields, "in `as_map` structs", name.span())?;
                let len = fields.len();
                let entries = fields.iter().map(|f| {
                    let key = f.ident.as_ref().map(wire_name).unwrap_or_default();
                    let member = &f.member;
                    let value = encode_field(f, quote! { &#member });
                    quote! {
                        os.write_str(#key)?;
                        #value
                    }
                });
                quote! {
                    os.write_map_header(#len)?;
                    #(#entries)*
                    Ok(())
                }
            } else {
                quote! {
                    os.write_object_header(<Self as bstream::EncodeFields>::FIELD_COUNT)?;
                    bstream::EncodeFields::encode_fields(self, os)
                }
            };

            Ok(quote! {
                #field_list

                impl #impl_generics bstream::Encoder for #name #ty_generics #where_clause {
                    fn encode(&self, os: &mut bstream::OutputStream) -> bstream::Result<()> {
                        #body
                    }
                }
            })
        }
        Data::Enum(e) => {
            let body = if is_fieldless(e) {
                let arms = e.variants.iter().map(|v| {
                    let ident = &v.ident;
                    quote! { #name::#ident => #name::#ident as i64, }
                });
                quote! {
                    let value: i64 = match *self {
                        #(#arms)*
                    };
                    os.write_int(value)?;
                    Ok(())
                }
            } else {
                let mut arms = Vec::new();
                for (index, v) in e.variants.iter().enumerate() {
                    let ident = &v.ident;
                    let fields = collect_fields(&v.fields, Some("field"))?;
                    reject_base(&fields, "in enum variants", ident.span())?;
                    let index = index as u32;
                    let len = 1 + fields.len();
                    let pattern = variant_pattern(quote! { #name::#ident }, &v.fields);
                    let field_encode = fields.iter().map(|f| encode_field(f, f.member.clone()));
                    arms.push(quote! {
                        #pattern => {
                            os.write_array_header(#len)?;
                            os.write_uint(#index as u64)?;
                            #(#field_encode)*
                        }
                    });
                }
                quote! {
                    match self {
                        #(#arms)*
                    }
                    Ok(())
                }
            };
            Ok(quote! {
                impl #impl_generics bstream::Encoder for #name #ty_generics #where_clause {
                    fn encode(&self, os: &mut bstream::OutputStream) -> bstream::Result<()> {
                        #body
                    }
                }
            })
        }
        Data::Union(_) => Err(syn::Error::new(
            name.span(),
            "Unions are not supported",
        )),
    }
}

/// Derive macro for implementing the `Decoder` trait
///
/// Reads what `#[derive(Encode)]` writes. Array-framed structs must carry
/// exactly their field count; map-framed structs accept their fields in any
/// order but reject unknown or missing names.
///
/// # Examples
///
/// ```ignore
/// #[derive(Decode)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
/// ```
#[proc_macro_derive(Decode, attributes(bstream))]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_decode(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_decode(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = wire_name(name);
    let generics = add_trait_bounds(input.generics.clone(), quote! { bstream::Decoder });
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let container = get_container_attributes(&input.attrs)?;

    match &input.data {
        Data::Struct(s) => {
            let fields = collect_fields(&s.fields, None)?;
            let counts = fields.iter().map(decode_field_count);
            let values = fields.iter().map(decode_field).collect();
            let constructed = construct(quote! { #name }, &s.fields, values);
            let field_list = quote! {
                impl #impl_generics bstream::DecodeFields for #name #ty_generics #where_clause {
                    const FIELD_COUNT: usize = 0usize #(+ #counts)*;

                    #[allow(unused_variables)]
                    fn decode_fields(is: &mut bstream::InputStream) -> bstream::Result<Self> {
                        Ok(#constructed)
                    }
                }
            };

            let body = if container.as_map {
                if !matches!(s.fields, Fields::Named(_)) {
                    return Err(syn::Error::new(
                        name.span(),
                        "`#[bstream(as_map)]` requires named fields",
                    ));
                }
                reject_base(&fields, "in `as_map` structs", name.span())?;
                let len = fields.len();
                let slots: Vec<Ident> = fields
                    .iter()
                    .filter_map(|f| f.ident.as_ref())
                    .map(|ident| format_ident!("__bstream_{}", ident))
                    .collect();
                let declarations = fields.iter().zip(&slots).map(|(f, slot)| {
                    let ty = &f.ty;
                    quote! { let mut #slot: Option<#ty> = None; }
                });
                let arms = fields.iter().zip(&slots).map(|(f, slot)| {
                    let key = f.ident.as_ref().map(wire_name).unwrap_or_default();
                    let value = decode_field(f);
                    quote! { #key => #slot = Some(#value), }
                });
                let assignments: Vec<TokenStream2> = fields
                    .iter()
                    .zip(&slots)
                    .map(|(f, slot)| {
                        let key = f.ident.as_ref().map(wire_name).unwrap_or_default();
                        quote! {
                            #slot.ok_or(bstream::StructDecodeError::MissingRequiredField {
                                field: #key,
                                struct_name: #name_str,
                            })?
                        }
                    })
                    .collect();
                let constructed = construct(quote! { #name }, &s.fields, assignments);
                quote! {
                    let count = is.read_map_header()?;
                    if count != #len {
                        return Err(bstream::StructDecodeError::FieldCountMismatch {
                            struct_name: #name_str,
                            expected: #len,
                            actual: count,
                        }
                        .into());
                    }
                    #(#declarations)*
                    for _ in 0..count {
                        let key = is.read_str()?;
                        match key.as_str() {
                            #(#arms)*
                            other => {
                                return Err(bstream::StructDecodeError::UnknownField {
                                    field: other.to_string(),
                                    struct_name: #name_str,
                                }
                                .into());
                            }
                        }
                    }
                    Ok(#constructed)
                }
            } else {
                quote! {
                    let count = is.read_array_header()?;
                    let expected = <Self as bstream::DecodeFields>::FIELD_COUNT;
                    if count != expected {
                        return Err(bstream::StructDecodeError::FieldCountMismatch {
                            struct_name: #name_str,
                            expected,
                            actual: count,
                        }
                        .into());
                    }
                    <Self as bstream::DecodeFields>::decode_fields(is)
                }
            };

            Ok(quote! {
                #field_list

                impl #impl_generics bstream::Decoder for #name #ty_generics #where_clause {
                    fn decode(is: &mut bstream::InputStream) -> bstream::Result<Self> {
                        #body
                    }
                }
            })
        }
        Data::Enum(e) => {
            let body = if is_fieldless(e) {
                let checks = e.variants.iter().map(|v| {
                    let ident = &v.ident;
                    quote! {
                        if value == #name::#ident as i64 {
                            return Ok(#name::#ident);
                        }
                    }
                });
                quote! {
                    let value = <i64 as bstream::Decoder>::decode(is)?;
                    #(#checks)*
                    Err(bstream::EnumDecodeError::UnknownDiscriminant {
                        value,
                        enum_name: #name_str,
                    }
                    .into())
                }
            } else {
                let mut arms = Vec::new();
                for (index, v) in e.variants.iter().enumerate() {
                    let ident = &v.ident;
                    let variant_str = wire_name(ident);
                    let fields = collect_fields(&v.fields, Some("field"))?;
                    reject_base(&fields, "in enum variants", ident.span())?;
                    let index = index as u32;
                    let field_len = fields.len();
                    let values = fields.iter().map(decode_field).collect();
                    let constructed = construct(quote! { #name::#ident }, &v.fields, values);
                    arms.push(quote! {
                        #index => {
                            if len - 1 != #field_len {
                                return Err(bstream::EnumDecodeError::FieldCountMismatch {
                                    enum_name: #name_str,
                                    variant_name: #variant_str,
                                    expected: #field_len,
                                    actual: len - 1,
                                }
                                .into());
                            }
                            Ok(#constructed)
                        }
                    });
                }
                quote! {
                    let len = is.read_array_header()?;
                    if len == 0 {
                        return Err(bstream::EncoderError::Type(format!(
                            "Empty variant array for enum {}",
                            #name_str
                        )));
                    }
                    let index = <u32 as bstream::Decoder>::decode(is)?;
                    match index {
                        #(#arms)*
                        _ => Err(bstream::EnumDecodeError::UnknownVariant {
                            index,
                            enum_name: #name_str,
                        }
                        .into()),
                    }
                }
            };
            Ok(quote! {
                impl #impl_generics bstream::Decoder for #name #ty_generics #where_clause {
                    fn decode(is: &mut bstream::InputStream) -> bstream::Result<Self> {
                        #body
                    }
                }
            })
        }
        Data::Union(_) => Err(syn::Error::new(
            name.span(),
            "Unions are not supported",
        )),
    }
}
