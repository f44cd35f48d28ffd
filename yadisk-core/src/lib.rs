mod client;

pub use client::{Resource, ResourceList, ResourceType, TransferLink, YadiskClient, YadiskError};
