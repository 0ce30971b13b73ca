//! Route configuration resource type (RDS payload).

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteConfiguration {
    /// A port-number string for per-port outbound configs, or a well-known
    /// literal for the HTTP proxy aggregate.
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub virtual_hosts: Vec<VirtualHost>,
    /// Wrapped `google.protobuf.BoolValue`.
    #[prost(message, optional, tag = "7")]
    pub validate_clusters: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VirtualHost {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub domains: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub routes: Vec<Route>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Route {
    #[prost(message, optional, tag = "1")]
    pub r#match: Option<RouteMatch>,
    #[prost(message, optional, tag = "5")]
    pub decorator: Option<Decorator>,
    #[prost(oneof = "route::Action", tags = "2, 3")]
    pub action: Option<route::Action>,
}

pub mod route {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Action {
        #[prost(message, tag = "2")]
        Route(super::RouteAction),
        #[prost(message, tag = "3")]
        Redirect(super::RedirectAction),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteMatch {
    #[prost(oneof = "route_match::PathSpecifier", tags = "1, 2")]
    pub path_specifier: Option<route_match::PathSpecifier>,
}

pub mod route_match {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PathSpecifier {
        #[prost(string, tag = "1")]
        Prefix(String),
        #[prost(string, tag = "2")]
        Path(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteAction {
    #[prost(string, tag = "5")]
    pub prefix_rewrite: String,
    #[prost(string, tag = "6")]
    pub host_rewrite: String,
    #[prost(message, optional, tag = "8")]
    pub timeout: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "9")]
    pub retry_policy: Option<RetryPolicy>,
    #[prost(message, repeated, tag = "25")]
    pub upgrade_configs: Vec<route_action::UpgradeConfig>,
    #[prost(oneof = "route_action::ClusterSpecifier", tags = "1, 3")]
    pub cluster_specifier: Option<route_action::ClusterSpecifier>,
}

pub mod route_action {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ClusterSpecifier {
        #[prost(string, tag = "1")]
        Cluster(String),
        #[prost(message, tag = "3")]
        WeightedClusters(super::WeightedCluster),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UpgradeConfig {
        #[prost(string, tag = "1")]
        pub upgrade_type: String,
        /// Wrapped `google.protobuf.BoolValue`.
        #[prost(message, optional, tag = "2")]
        pub enabled: Option<bool>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WeightedCluster {
    #[prost(message, repeated, tag = "1")]
    pub clusters: Vec<weighted_cluster::ClusterWeight>,
}

pub mod weighted_cluster {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClusterWeight {
        #[prost(string, tag = "1")]
        pub name: String,
        /// Wrapped `google.protobuf.UInt32Value`.
        #[prost(message, optional, tag = "2")]
        pub weight: Option<u32>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetryPolicy {
    #[prost(string, tag = "1")]
    pub retry_on: String,
    #[prost(message, optional, tag = "2")]
    pub num_retries: Option<u32>,
    #[prost(message, optional, tag = "3")]
    pub per_try_timeout: Option<prost_types::Duration>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RedirectAction {
    #[prost(string, tag = "1")]
    pub host_redirect: String,
    #[prost(string, tag = "2")]
    pub path_redirect: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Decorator {
    #[prost(string, tag = "1")]
    pub operation: String,
}

impl RouteConfiguration {
    pub const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
}

impl Route {
    /// A catch-all prefix route to a single cluster.
    pub fn default_to_cluster(cluster: impl Into<String>) -> Self {
        Route {
            r#match: Some(RouteMatch {
                path_specifier: Some(route_match::PathSpecifier::Prefix("/".to_string())),
            }),
            decorator: Some(Decorator {
                operation: "default-route".to_string(),
            }),
            action: Some(route::Action::Route(RouteAction {
                cluster_specifier: Some(route_action::ClusterSpecifier::Cluster(cluster.into())),
                ..Default::default()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_shape() {
        let route = Route::default_to_cluster("outbound|80||a.default.svc.cluster.local");
        match route.r#match.unwrap().path_specifier.unwrap() {
            route_match::PathSpecifier::Prefix(p) => assert_eq!(p, "/"),
            other => panic!("unexpected matcher: {other:?}"),
        }
        match route.action.unwrap() {
            route::Action::Route(action) => match action.cluster_specifier.unwrap() {
                route_action::ClusterSpecifier::Cluster(name) => {
                    assert_eq!(name, "outbound|80||a.default.svc.cluster.local");
                }
                other => panic!("unexpected cluster specifier: {other:?}"),
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
