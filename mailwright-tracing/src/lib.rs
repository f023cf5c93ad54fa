//! Attribute macros used to trace the mailer's orchestration entry points.
//!
//! `#[traced]` wraps a function so that a `trace` event is emitted when it is
//! entered and when it returns (including early returns and `?`), optionally
//! reporting the elapsed time and forwarding arguments to
//! `#[tracing::instrument]`.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip_all), timing(precision = "ms"))]
//! pub async fn send(&self, email: &Email) -> Result<SendResult, MailError> { .. }
//! ```

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, Stmt, parse::Parse, parse_macro_input, parse_quote};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Precision {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ns" | "nanos" | "nanoseconds" => Some(Self::Nanos),
            "us" | "micros" | "microseconds" => Some(Self::Micros),
            "ms" | "millis" | "milliseconds" => Some(Self::Millis),
            "s" | "secs" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    /// Expression converting a `Duration` named `elapsed` into a display string.
    fn render(self) -> syn::Expr {
        match self {
            Self::Nanos => parse_quote!(format!("{}ns", elapsed.as_nanos())),
            Self::Micros => parse_quote!(format!("{}us", elapsed.as_micros())),
            Self::Millis => parse_quote!(format!("{}ms", elapsed.as_millis())),
            Self::Seconds => parse_quote!(format!("{:.3}s", elapsed.as_secs_f64())),
        }
    }
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

fn parse_precision(input: syn::parse::ParseStream) -> syn::Result<Precision> {
    if !input.peek(syn::token::Paren) {
        return Ok(Precision::default());
    }

    let content;
    syn::parenthesized!(content in input);
    content.parse::<keywords::precision>()?;
    content.parse::<syn::Token![=]>()?;
    let literal = content.parse::<syn::LitStr>()?;

    Precision::from_name(&literal.value()).ok_or_else(|| {
        syn::Error::new(
            literal.span(),
            "unknown precision, expected one of \"ns\", \"us\", \"ms\" or \"s\"",
        )
    })
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                let keyword = input.parse::<keywords::timing>()?;
                if attributes.timing.is_some() {
                    return Err(syn::Error::new(keyword.span, "`timing` given more than once"));
                }
                attributes.timing = Some(parse_precision(input)?);
            } else if lookahead.peek(keywords::instrument) {
                let keyword = input.parse::<keywords::instrument>()?;
                if attributes.instrument.is_some() {
                    return Err(syn::Error::new(
                        keyword.span,
                        "`instrument` given more than once",
                    ));
                }
                let mut fields = TokenStream::new();
                if input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in input);
                    fields = content.parse()?;
                }
                attributes.instrument = Some(fields);
            } else if lookahead.peek(syn::Token![,]) {
                input.parse::<syn::Token![,]>()?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(attributes)
    }
}

fn expand(attributes: Attributes, mut item_fn: ItemFn) -> TokenStream {
    item_fn
        .attrs
        .push(parse_quote!(#[allow(clippy::items_after_statements)]));

    if let Some(fields) = attributes.instrument {
        item_fn
            .attrs
            .push(parse_quote!(#[tracing::instrument(#fields)]));
    }

    let operation = item_fn.sig.ident.to_string();
    let on_exit: Stmt = match attributes.timing {
        Some(precision) => {
            let render = precision.render();
            parse_quote! {
                {
                    let elapsed = self.started.elapsed();
                    let elapsed = #render;
                    tracing::trace!(
                        target: "mailwright::traced",
                        operation = #operation,
                        elapsed = %elapsed,
                        "exit"
                    );
                }
            }
        }
        None => parse_quote! {
            tracing::trace!(target: "mailwright::traced", operation = #operation, "exit");
        },
    };

    let prelude: Vec<Stmt> = parse_quote! {
        struct __TracedGuard {
            started: std::time::Instant,
        }

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        tracing::trace!(target: "mailwright::traced", operation = #operation, "enter");
        let __traced_guard = __TracedGuard {
            started: std::time::Instant::now(),
        };
    };

    let body = std::mem::take(&mut item_fn.block.stmts);
    item_fn.block.stmts = prelude.into_iter().chain(body).collect();

    quote! { #item_fn }
}

/// Emits `trace` events on entry to and exit from the attributed function.
///
/// Accepts `instrument(...)`, forwarded verbatim to `#[tracing::instrument]`,
/// and `timing(precision = "ns" | "us" | "ms" | "s")`, which adds an
/// `elapsed` field to the exit event.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let attributes = parse_macro_input!(args as Attributes);
    let item_fn = parse_macro_input!(item as ItemFn);

    expand(attributes, item_fn).into()
}
