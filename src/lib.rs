// =============================================================================
// Aurora Gateway — control-plane HTTP+WebSocket gateway library
// =============================================================================
//
// Shared between the `aurora-gateway` server binary and the `calc-tools`
// stdio JSON-RPC binary. The gateway itself (rate limiting, the WS hub, the
// control proxy, and the exchange connector) lives here so both binaries can
// be built from one crate.
// =============================================================================

pub mod alerts;
pub mod api;
pub mod app_state;
pub mod calc_tools;
pub mod control_proxy;
pub mod exchange;
pub mod rate_limit;
pub mod runtime_config;
pub mod store;
pub mod types;
pub mod ws_hub;
