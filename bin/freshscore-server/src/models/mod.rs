//! Request / response DTO (Data Transfer Object) types.
//!
//! These types are used by Axum handlers for JSON (de)serialisation and are
//! annotated with [`utoipa`] attributes to generate an OpenAPI 3.0 schema.
//! The structured detection result additionally derives
//! [`schemars::JsonSchema`] because its schema is shipped to the model
//! provider as the response contract.

pub mod detection;
pub mod upload;
