// hub-test-utils: shared test utilities for the hub's integration suite.
//
// Provides a mock WebSocket client for round-tripping envelopes through a
// running hub instance in integration tests.

pub mod mock_ws_client;

pub use mock_ws_client::MockWsClient;
