//! Infrastructure layer: outbound HTTP clients and the inbound hub processor.

pub mod external_api;
pub mod hub;

pub use external_api::{ApiConfig, ApiErrorKind, ApiRegistry, ApiRequestError, ApiWrapper, RequestOptions};
pub use hub::{
    HubConfig, HubError, HubMessageProcessor, InMemoryHubStore, PostgresConnector, ProcessingOutcome,
    RescheduleOutcome, StoreError,
};
