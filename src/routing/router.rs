//! Route table, lookup and registration.
//!
//! # Responsibilities
//! - Store route descriptors (template, methods, optional name)
//! - Resolve a request to a low-cardinality route label
//! - Register handlers in the dispatch router and the table together
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First registered match wins
//! - Explicit NotFound / NoMatch rather than silent default

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{any, on, MethodFilter};

use crate::routing::matcher::{make_label_value, PathTemplate};

/// Label used when a request did not resolve to any route.
pub const OTHER_ROUTE: &str = "other";

/// Label used when the table reports an explicit not-found.
pub const NOT_FOUND_ROUTE: &str = "notfound";

/// A registered route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    template: PathTemplate,
    methods: Vec<Method>,
    name: Option<String>,
}

impl RouteDescriptor {
    pub fn new(template: &str, methods: &[Method], name: Option<&str>) -> Self {
        Self {
            template: PathTemplate::parse(template),
            methods: methods.to_vec(),
            name: name.map(str::to_owned),
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.template.matches(path)
    }

    /// Label for metrics and tracing: the explicit name or one derived from
    /// the template.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => make_label_value(self.template.as_str()),
        }
    }

    pub fn template(&self) -> &str {
        self.template.as_str()
    }
}

/// Outcome of a route lookup.
#[derive(Debug, Clone, Copy)]
pub enum RouteMatch<'a> {
    /// A route accepted the method and path.
    Matched(&'a RouteDescriptor),
    /// Nothing matched and a not-found handler is registered.
    NotFound,
    /// Nothing matched.
    NoMatch,
}

/// The routing table, frozen after startup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
    has_not_found: bool,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, route: RouteDescriptor) {
        self.routes.push(route);
    }

    pub fn set_not_found(&mut self) {
        self.has_not_found = true;
    }

    /// Look up the route for a method and path.
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        if let Some(route) = self.routes.iter().find(|r| r.matches(method, path)) {
            return RouteMatch::Matched(route);
        }

        // A path that exists with another method is a mismatch, not a not-found.
        let path_known = self.routes.iter().any(|r| r.template.matches(path));
        if self.has_not_found && !path_known {
            RouteMatch::NotFound
        } else {
            RouteMatch::NoMatch
        }
    }

    /// Route name for tracing: empty when nothing matched.
    pub fn route_name(&self, method: &Method, path: &str) -> String {
        match self.match_route(method, path) {
            RouteMatch::Matched(route) => route.label(),
            RouteMatch::NotFound => NOT_FOUND_ROUTE.to_owned(),
            RouteMatch::NoMatch => String::new(),
        }
    }

    /// Route label for metrics: never empty.
    pub fn route_label(&self, method: &Method, path: &str) -> String {
        let name = self.route_name(method, path);
        if name.is_empty() {
            OTHER_ROUTE.to_owned()
        } else {
            name
        }
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }
}

/// Registers handlers in the dispatch router and the route table at once so
/// labels and dispatch cannot disagree.
pub struct Registerer {
    prefix: String,
    router: axum::Router,
    table: RouteTable,
}

impl Registerer {
    /// Create a registerer. Every path is served under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_owned(),
            router: axum::Router::new(),
            table: RouteTable::new(),
        }
    }

    /// Register an unnamed route; its label is derived from the template.
    pub fn register_route<H, T>(&mut self, path: &str, methods: &[Method], handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.register(path, methods, None, handler);
    }

    /// Register a route with an explicit label.
    pub fn register_named_route<H, T>(
        &mut self,
        name: &str,
        path: &str,
        methods: &[Method],
        handler: H,
    ) where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.register(path, methods, Some(name), handler);
    }

    /// Catch every unmatched request with `handler`.
    pub fn register_not_found<H, T>(&mut self, handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let router = std::mem::take(&mut self.router);
        self.router = router.fallback(handler);
        self.table.set_not_found();
    }

    fn register<H, T>(&mut self, path: &str, methods: &[Method], name: Option<&str>, handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let full_path = format!("{}{}", self.prefix, path);
        let filter = methods
            .iter()
            .filter_map(|m| MethodFilter::try_from(m.clone()).ok())
            .reduce(MethodFilter::or);

        tracing::debug!(path = %full_path, ?methods, "Registering route");

        // An empty method list accepts every method, as the table does.
        let method_router = match filter {
            Some(filter) => on(filter, handler),
            None => any(handler),
        };
        let router = std::mem::take(&mut self.router);
        self.router = router.route(&full_path, method_router);
        self.table
            .push(RouteDescriptor::new(&full_path, methods, name));
    }

    /// Freeze registration.
    pub fn finish(self) -> (axum::Router, RouteTable) {
        (self.router, self.table)
    }
}
