//! Procedural macros for `weft`.
//!
//! - `#[weft::main]` and `#[weft::test]` run an `async fn` body on the
//!   current thread's loop through `Loop::block_on`.
//! - `join!` awaits several futures and returns all their outputs.
//! - `select!` awaits the first of several futures and drops the rest.
//!
//! The expansions are built as source text and reparsed, so the crate has
//! no dependency on `syn` or `quote`.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Awaits every future and evaluates to a tuple of their outputs.
///
/// ```rust,ignore
/// let (a, b) = weft::join!(fetch_a(), fetch_b());
/// ```
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let futures: Vec<String> = utils::split_args(input)
        .iter()
        .map(|tokens| utils::tokens_to_string(tokens))
        .collect();

    match futures.len() {
        0 => return utils::reparse("()", "join"),
        1 => return utils::reparse(&format!("{{ ({}).await }}", futures[0]), "join"),
        _ => {}
    }

    let mut out = String::from("{\n");

    for (i, future) in futures.iter().enumerate() {
        out.push_str(&format!(
            "let mut __join{i} = ::std::boxed::Box::pin({future});\n\
             let mut __done{i} = ::core::option::Option::None;\n"
        ));
    }

    out.push_str(
        "::std::future::poll_fn(move |__cx| {\n\
             use ::std::future::Future as _;\n\
             use ::std::task::Poll;\n",
    );

    for i in 0..futures.len() {
        out.push_str(&format!(
            "if __done{i}.is_none() {{\n\
                 if let Poll::Ready(__value) = __join{i}.as_mut().poll(__cx) {{\n\
                     __done{i} = ::core::option::Option::Some(__value);\n\
                 }}\n\
             }}\n"
        ));
    }

    let pending = (0..futures.len())
        .map(|i| format!("__done{i}.is_none()"))
        .collect::<Vec<_>>()
        .join(" || ");

    let outputs = (0..futures.len())
        .map(|i| format!("__done{i}.take().unwrap()"))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!(
        "if {pending} {{ return Poll::Pending; }}\n\
         Poll::Ready(({outputs},))\n\
         }}).await\n\
         }}\n"
    ));

    utils::reparse(&out, "join")
}

/// Awaits the first future to finish and runs its handler.
///
/// Futures are polled in the order written. The others are dropped
/// before the handler runs, which cancels any timer or subscription they
/// registered.
///
/// ```rust,ignore
/// let which = weft::select!(
///     time::sleep(short) => |_| "timer",
///     notifier.wait() => |_| "notified",
/// );
/// ```
#[proc_macro]
pub fn select(input: TokenStream) -> TokenStream {
    let branches = utils::parse_select_branches(input);

    if branches.is_empty() {
        return utils::reparse("()", "select");
    }

    let generics = (0..branches.len())
        .map(|i| format!("__T{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = format!("{{\nenum __Branch<{generics}> {{\n");
    for i in 0..branches.len() {
        out.push_str(&format!("    __B{i}(__T{i}),\n"));
    }
    out.push_str("}\n");

    for (i, (future, _)) in branches.iter().enumerate() {
        out.push_str(&format!(
            "let mut __select{i} = ::std::boxed::Box::pin({future});\n"
        ));
    }

    out.push_str(
        "let __winner = ::std::future::poll_fn(move |__cx| {\n\
             use ::std::future::Future as _;\n\
             use ::std::task::Poll;\n",
    );

    for i in 0..branches.len() {
        out.push_str(&format!(
            "if let Poll::Ready(__value) = __select{i}.as_mut().poll(__cx) {{\n\
                 return Poll::Ready(__Branch::__B{i}(__value));\n\
             }}\n"
        ));
    }

    out.push_str("Poll::Pending\n}).await;\n");

    out.push_str("match __winner {\n");
    for (i, (_, handler)) in branches.iter().enumerate() {
        out.push_str(&format!(
            "    __Branch::__B{i}(__value) => ({handler})(__value),\n"
        ));
    }
    out.push_str("}\n}\n");

    utils::reparse(&out, "select")
}

/// Runs an `async fn main` on the current thread's loop.
///
/// Accepts `name = "..."` and `capacity = N`, forwarded to
/// `weft::LoopBuilder`.
///
/// ```rust,ignore
/// #[weft::main(name = "ui")]
/// async fn main() {
///     weft::time::sleep(std::time::Duration::from_millis(10)).await;
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = match utils::LoopOptions::parse(attr) {
        Ok(options) => options,
        Err(message) => return utils::compile_error(&message),
    };

    wrap_async_body(item, &options, "main", false)
}

/// Runs an `async fn` test on a loop owned by the test's thread.
///
/// Takes the same options as `#[weft::main]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = match utils::LoopOptions::parse(attr) {
        Ok(options) => options,
        Err(message) => return utils::compile_error(&message),
    };

    wrap_async_body(item, &options, "test", true)
}

/// Strips `async` from the function signature and replaces its body with
/// a `block_on` of the original body.
fn wrap_async_body(
    item: TokenStream,
    options: &utils::LoopOptions,
    which: &str,
    add_test_attr: bool,
) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return utils::compile_error(&format!("#[weft::{which}] expects an `async fn`"));
    };
    tokens.remove(async_pos);

    let Some(body_pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error(&format!("#[weft::{which}] expects a function body"));
    };

    let body = match &tokens[body_pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let wrapped = format!(
        "{{\n\
             let __loop = {};\n\
             __loop.block_on(async move {{ {body} }})\n\
         }}",
        options.loop_expr(),
    );

    let wrapped = match wrapped.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => return utils::compile_error(&format!("weft::{which}: {err}")),
    };

    tokens[body_pos] = TokenTree::Group(Group::new(Delimiter::Brace, wrapped));

    let mut out: Vec<TokenTree> = Vec::new();
    if add_test_attr {
        out.extend(utils::reparse("#[test]", which));
    }
    out.extend(tokens);

    out.into_iter().collect()
}
