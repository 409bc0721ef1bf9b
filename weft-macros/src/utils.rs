use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` on its top-level commas.
///
/// Commas inside groups stay with their group, so `f(a, b), g()` gives two
/// arguments. Empty arguments (trailing commas) are skipped.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Renders tokens back to source, keeping adjacent identifiers apart.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let s = t.to_string();

        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&s);
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// `=>` at position `i`.
fn is_arrow(tokens: &[TokenTree], i: usize) -> bool {
    if i + 1 >= tokens.len() {
        return false;
    }

    matches!(
        (&tokens[i], &tokens[i + 1]),
        (TokenTree::Punct(p1), TokenTree::Punct(p2))
            if p1.as_char() == '=' && p2.as_char() == '>'
    )
}

/// Parses `future => handler` branches separated by commas.
///
/// Returns `(future, handler)` source pairs. A branch missing either side
/// is skipped.
pub(crate) fn parse_select_branches(input: TokenStream) -> Vec<(String, String)> {
    let args = split_args(input);
    let mut branches = Vec::new();

    for arg in args {
        let tokens = arg;
        let mut i = 0;

        let mut future_tokens = Vec::new();
        while i < tokens.len() {
            if is_arrow(&tokens, i) {
                i += 2;
                break;
            }
            future_tokens.push(tokens[i].clone());
            i += 1;
        }

        let handler_tokens = &tokens[i.min(tokens.len())..];

        let future = tokens_to_string(&future_tokens);
        let handler = tokens_to_string(handler_tokens);

        if !future.trim().is_empty() && !handler.trim().is_empty() {
            branches.push((future, handler));
        }
    }

    branches
}

/// Parses `source`, or turns the parse error into a `compile_error!`.
pub(crate) fn reparse(source: &str, which: &str) -> TokenStream {
    source
        .parse()
        .unwrap_or_else(|err| compile_error(&format!("weft::{which}: {err}")))
}

pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}

/// Options accepted by `#[weft::main]` and `#[weft::test]`.
#[derive(Default)]
pub(crate) struct LoopOptions {
    /// The string literal as written, quotes included.
    name: Option<String>,
    capacity: Option<usize>,
}

impl LoopOptions {
    /// Parses `key = value` pairs separated by commas.
    pub(crate) fn parse(attr: TokenStream) -> Result<Self, String> {
        let mut options = Self::default();

        for arg in split_args(attr) {
            let [TokenTree::Ident(key), TokenTree::Punct(eq), value] = arg.as_slice() else {
                return Err(format!(
                    "expected `key = value`, found `{}`",
                    tokens_to_string(&arg)
                ));
            };

            if eq.as_char() != '=' {
                return Err(format!("expected `=` after `{key}`"));
            }

            let TokenTree::Literal(literal) = value else {
                return Err(format!("`{key}` expects a literal"));
            };
            let literal = literal.to_string();

            match key.to_string().as_str() {
                "name" => {
                    if !literal.starts_with('"') {
                        return Err("`name` expects a string literal".to_string());
                    }
                    options.name = Some(literal);
                }
                "capacity" => {
                    let digits: String = literal.chars().filter(|c| *c != '_').collect();
                    let capacity = digits
                        .trim_end_matches("usize")
                        .parse()
                        .map_err(|_| "`capacity` expects an integer literal".to_string())?;
                    options.capacity = Some(capacity);
                }
                other => return Err(format!("unknown option `{other}`")),
            }
        }

        Ok(options)
    }

    /// Expression that yields the thread's `weft::Loop`.
    ///
    /// Without options the existing loop is reused; with options a new one
    /// is built and installation failure panics.
    pub(crate) fn loop_expr(&self) -> String {
        if self.name.is_none() && self.capacity.is_none() {
            return "::weft::Loop::local()".to_string();
        }

        let mut expr = String::from("::weft::LoopBuilder::new()");
        if let Some(name) = &self.name {
            expr.push_str(&format!(".name({name})"));
        }
        if let Some(capacity) = self.capacity {
            expr.push_str(&format!(".capacity({capacity})"));
        }
        expr.push_str(".build().expect(\"failed to install the weft loop\")");
        expr
    }
}
