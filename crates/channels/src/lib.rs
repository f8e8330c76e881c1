//! Collaborator seams for the relay engine.
//!
//! A chat platform plugs into the relay by implementing [`EndpointProvider`]
//! (create webhook-like delivery handles in a channel) and
//! [`DeliveryEndpoint`] (post a rendered [`RelayPayload`] through one of
//! them). Content classification is consumed through [`ContentFilter`].

pub mod error;
pub mod filter;
pub mod gating;
pub mod payload;
pub mod plugin;

pub use {
    error::{DeliveryError, FilterError, ProvisionError},
    filter::{Classification, ContentFilter, Severity},
    gating::Permissions,
    payload::{Attachment, Embed, EmbedField, EmbedFooter, InboundMessage, RelayPayload},
    plugin::{DeliveryEndpoint, EndpointCredentials, EndpointHandle, EndpointProvider},
};
