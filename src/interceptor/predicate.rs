use crate::context::RequestContext;
use axum::http::Method;
use std::fmt;

/// Decides per request whether a conditional interceptor applies.
pub trait RequestPredicate: Send + Sync {
    fn matches(&self, ctx: &RequestContext) -> bool;

    /// Relative evaluation cost, used to decide whether sharing the result
    /// between interceptors is worth a memo.
    fn cost(&self) -> usize {
        1
    }
}

/// Path patterns with `*` (one segment) and `**` (any number of segments).
///
/// Matches when any include pattern matches and no exclude pattern does.
#[derive(Debug, Clone, Default)]
pub struct PathPredicate {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl PathPredicate {
    pub fn new<I, S>(includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            includes: includes.into_iter().map(Into::into).collect(),
            excludes: Vec::new(),
        }
    }

    pub fn exclude<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(excludes.into_iter().map(Into::into));
        self
    }

    pub fn matches_path(&self, path: &str) -> bool {
        let segments = split(path);
        self.includes.iter().any(|p| glob(&split(p), &segments))
            && !self.excludes.iter().any(|p| glob(&split(p), &segments))
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn glob(pattern: &[&str], path: &[&str]) -> bool {
    match (pattern.split_first(), path.split_first()) {
        (None, None) => true,
        (Some((&"**", rest)), _) => {
            glob(rest, path) || path.split_first().is_some_and(|(_, tail)| glob(pattern, tail))
        }
        (Some((&"*", rest)), Some((_, tail))) => glob(rest, tail),
        (Some((seg, rest)), Some((actual, tail))) => seg == actual && glob(rest, tail),
        _ => false,
    }
}

impl RequestPredicate for PathPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.matches_path(ctx.path())
    }

    fn cost(&self) -> usize {
        self.includes.len() + self.excludes.len()
    }
}

#[derive(Debug, Clone)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

impl MethodPredicate {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl RequestPredicate for MethodPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.methods.contains(ctx.method())
    }
}

/// Presence of a header, optionally with an exact value.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: String,
    value: Option<String>,
}

impl HeaderPredicate {
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

impl RequestPredicate for HeaderPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        match (ctx.header(&self.name), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// A closure predicate with an explicit cost.
pub struct FnPredicate<F> {
    f: F,
    cost: usize,
}

impl<F> FnPredicate<F>
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, cost: 1 }
    }

    pub fn with_cost(mut self, cost: usize) -> Self {
        self.cost = cost;
        self
    }
}

impl<F> RequestPredicate for FnPredicate<F>
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &RequestContext) -> bool {
        (self.f)(ctx)
    }

    fn cost(&self) -> usize {
        self.cost
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").field("cost", &self.cost).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_patterns() {
        let api = PathPredicate::new(["/api/**"]).exclude(["/api/health"]);
        assert!(api.matches_path("/api/users/7"));
        assert!(api.matches_path("/api"));
        assert!(!api.matches_path("/api/health"));
        assert!(!api.matches_path("/static/app.js"));

        let single = PathPredicate::new(["/users/*/orders"]);
        assert!(single.matches_path("/users/7/orders"));
        assert!(!single.matches_path("/users/7/8/orders"));
        assert!(!single.matches_path("/users/orders"));

        let middle = PathPredicate::new(["/**/edit"]);
        assert!(middle.matches_path("/a/b/c/edit"));
        assert!(middle.matches_path("/edit"));
        assert_eq!(api.cost(), 2);
    }

    #[test]
    fn test_method_and_header_predicates() {
        let ctx = RequestContext::get("/").with_header("x-debug", "1");
        assert!(MethodPredicate::new([Method::GET, Method::HEAD]).matches(&ctx));
        assert!(!MethodPredicate::new([Method::POST]).matches(&ctx));
        assert!(HeaderPredicate::present("x-debug").matches(&ctx));
        assert!(HeaderPredicate::equals("x-debug", "1").matches(&ctx));
        assert!(!HeaderPredicate::equals("x-debug", "0").matches(&ctx));
        assert!(!HeaderPredicate::present("x-trace").matches(&ctx));
    }

    #[test]
    fn test_fn_predicate() {
        let long = FnPredicate::new(|ctx: &RequestContext| ctx.path().len() > 5).with_cost(9);
        assert!(long.matches(&RequestContext::get("/reports")));
        assert!(!long.matches(&RequestContext::get("/a")));
        assert_eq!(long.cost(), 9);
    }
}
