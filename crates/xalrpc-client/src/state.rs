use xalrpc_common::protocol::{Interface, MethodSpec};

/// Connection details every remote proxy exposes about itself.
///
/// A proxy answers these names locally, without a round trip, whenever its
/// own interface does not declare a method of the same name.
pub trait ServiceState {
    fn service_name(&self) -> &str;

    fn service_host(&self) -> &str;

    fn service_port(&self) -> u16;

    /// Closes the proxy's pooled connections. Later calls reconnect.
    fn dispose_service_resources(&self);
}

pub const SERVICE_STATE: Interface = Interface::new(
    "ServiceState",
    &[
        MethodSpec::new("service_name", &[]),
        MethodSpec::new("service_host", &[]),
        MethodSpec::new("service_port", &[]),
        MethodSpec::new("dispose_service_resources", &[]),
    ],
);
