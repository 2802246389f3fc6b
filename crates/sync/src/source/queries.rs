//! GraphQL query definitions for the catalog endpoint.
//!
//! Response types are generated from `graphql/catalog/schema.graphql`. Every
//! field the backend may omit is nullable there, and validation happens in
//! `conversions`.

use graphql_client::GraphQLQuery;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/catalog/schema.graphql",
    query_path = "graphql/catalog/queries/products.graphql",
    response_derives = "Debug, Clone"
)]
pub struct GetAllPublishedProducts;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/catalog/schema.graphql",
    query_path = "graphql/catalog/queries/products.graphql",
    response_derives = "Debug, Clone"
)]
pub struct GetTotalProducts;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/catalog/schema.graphql",
    query_path = "graphql/catalog/queries/products.graphql",
    response_derives = "Debug, Clone"
)]
pub struct GetProductById;
