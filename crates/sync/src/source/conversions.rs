//! GraphQL response to domain type conversion functions.
//!
//! Conversions are all-or-nothing: a single invalid product fails the whole
//! page, so no partially valid page ever reaches the cache.

use shop_sync_core::{FetchedPage, Price, Product, ProductId};

use super::SourceError;
use super::queries::{get_all_published_products, get_product_by_id, get_total_products};

/// Product fields shared by every query selecting `ProductFields`.
struct ProductParts {
    id: String,
    database_id: Option<i64>,
    name: Option<String>,
    price: Option<String>,
    categories: Vec<Option<String>>,
    image_url: Option<String>,
}

impl From<get_all_published_products::ProductFields> for ProductParts {
    fn from(fields: get_all_published_products::ProductFields) -> Self {
        Self {
            id: fields.id,
            database_id: fields.database_id,
            name: fields.name,
            price: fields.price,
            categories: fields
                .product_categories
                .map(|c| c.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            image_url: fields.image.and_then(|i| i.source_url),
        }
    }
}

impl From<get_product_by_id::ProductFields> for ProductParts {
    fn from(fields: get_product_by_id::ProductFields) -> Self {
        Self {
            id: fields.id,
            database_id: fields.database_id,
            name: fields.name,
            price: fields.price,
            categories: fields
                .product_categories
                .map(|c| c.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            image_url: fields.image.and_then(|i| i.source_url),
        }
    }
}

fn convert_product(parts: ProductParts, cursor: Option<String>) -> Result<Product, SourceError> {
    let database_id = parts
        .database_id
        .ok_or_else(|| SourceError::Data("product is missing databaseId".to_string()))?;

    if parts.id.is_empty() {
        return Err(SourceError::Data(format!("product {database_id} is missing id")));
    }

    let raw_price = parts
        .price
        .ok_or_else(|| SourceError::Data(format!("product {database_id} has no price")))?;
    let price = Price::parse_display(&raw_price)
        .map_err(|e| SourceError::Data(format!("product {database_id}: {e}")))?;

    let mut categories: Vec<String> = Vec::new();
    for name in parts.categories.into_iter().flatten() {
        if !categories.contains(&name) {
            categories.push(name);
        }
    }

    Ok(Product {
        id: parts.id,
        product_id: ProductId::new(database_id),
        name: parts.name.unwrap_or_default(),
        price,
        categories,
        image_url: parts.image_url,
        cursor,
    })
}

/// Convert a product connection into a page.
pub fn convert_product_connection(
    connection: Option<get_all_published_products::GetAllPublishedProductsProducts>,
) -> Result<FetchedPage, SourceError> {
    let connection =
        connection.ok_or_else(|| SourceError::Data("products field missing".to_string()))?;

    let items = connection
        .edges
        .into_iter()
        .map(|edge| {
            let node = edge
                .node
                .ok_or_else(|| SourceError::Data("product edge without node".to_string()))?;
            convert_product(node.into(), edge.cursor)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (has_next_page, next_cursor) = connection
        .page_info
        .map_or((false, None), |info| (info.has_next_page, info.end_cursor));

    Ok(FetchedPage {
        items,
        has_next_page,
        next_cursor,
    })
}

/// Convert a single-product lookup. `None` when the product does not exist.
pub fn convert_product_lookup(
    data: get_product_by_id::ResponseData,
) -> Result<Option<Product>, SourceError> {
    data.product
        .map(|fields| convert_product(fields.into(), None))
        .transpose()
}

/// Extract the total product count.
pub fn convert_total_count(data: get_total_products::ResponseData) -> Result<u64, SourceError> {
    let total = data
        .total_products
        .ok_or_else(|| SourceError::Data("totalProducts field missing".to_string()))?;
    u64::try_from(total).map_err(|_| {
        SourceError::Data(format!("totalProducts is not a non-negative integer: {total}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn products_fixture() -> serde_json::Value {
        serde_json::json!({
            "products": {
                "edges": [
                    {
                        "cursor": "YXJyYXljb25uZWN0aW9uOjEwMQ==",
                        "node": {
                            "id": "cHJvZHVjdDoxMDE=",
                            "databaseId": 101,
                            "name": "Beanie",
                            "price": "&#36;9.99",
                            "productCategories": { "nodes": [
                                { "name": "Accessories" },
                                { "name": "Hats" },
                                { "name": "Accessories" }
                            ]},
                            "image": { "sourceUrl": "https://cdn.example.com/beanie.jpg" }
                        }
                    },
                    {
                        "cursor": "YXJyYXljb25uZWN0aW9uOjEwMg==",
                        "node": {
                            "id": "cHJvZHVjdDoxMDI=",
                            "databaseId": 102,
                            "name": "Hoodie",
                            "price": "$42.00 - $48.00",
                            "productCategories": null,
                            "image": null
                        }
                    }
                ],
                "pageInfo": { "hasNextPage": true, "endCursor": "YXJyYXljb25uZWN0aW9uOjEwMg==" }
            }
        })
    }

    fn page_from(json: serde_json::Value) -> Result<FetchedPage, SourceError> {
        let data: get_all_published_products::ResponseData = serde_json::from_value(json).unwrap();
        convert_product_connection(data.products)
    }

    #[test]
    fn test_convert_products_page() {
        let page = page_from(products_fixture()).unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.has_next_page);
        assert_eq!(
            page.next_cursor.as_deref(),
            Some("YXJyYXljb25uZWN0aW9uOjEwMg==")
        );

        let beanie = &page.items[0];
        assert_eq!(beanie.product_id, ProductId::new(101));
        assert_eq!(beanie.price.to_string(), "$9.99");
        assert_eq!(beanie.categories, vec!["Accessories", "Hats"]);
        assert_eq!(
            beanie.image_url.as_deref(),
            Some("https://cdn.example.com/beanie.jpg")
        );
        assert_eq!(beanie.cursor.as_deref(), Some("YXJyYXljb25uZWN0aW9uOjEwMQ=="));

        let hoodie = &page.items[1];
        assert_eq!(hoodie.price.to_string(), "$42.00");
        assert!(hoodie.categories.is_empty());
        assert_eq!(hoodie.image_url, None);
    }

    #[test]
    fn test_missing_products_field_is_data_error() {
        let err = page_from(serde_json::json!({ "products": null })).unwrap_err();
        assert!(matches!(err, SourceError::Data(_)));
    }

    #[test]
    fn test_one_bad_price_fails_the_page() {
        let mut fixture = products_fixture();
        fixture["products"]["edges"][1]["node"]["price"] = serde_json::Value::Null;

        let err = page_from(fixture).unwrap_err();
        assert_eq!(err.to_string(), "Invalid response: product 102 has no price");
    }

    #[test]
    fn test_decimal_comma_price_fails_the_page() {
        let mut fixture = products_fixture();
        fixture["products"]["edges"][0]["node"]["price"] = serde_json::json!("9,99 €");

        assert!(matches!(page_from(fixture), Err(SourceError::Data(_))));
    }

    #[test]
    fn test_missing_page_info_means_last_page() {
        let page = page_from(serde_json::json!({
            "products": { "edges": [], "pageInfo": null }
        }))
        .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_next_page);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_convert_total_count() {
        let data: get_total_products::ResponseData =
            serde_json::from_value(serde_json::json!({ "totalProducts": 25 })).unwrap();
        assert_eq!(convert_total_count(data).unwrap(), 25);
    }

    #[test]
    fn test_total_count_rejects_missing_and_negative() {
        let missing: get_total_products::ResponseData =
            serde_json::from_value(serde_json::json!({ "totalProducts": null })).unwrap();
        assert!(matches!(
            convert_total_count(missing),
            Err(SourceError::Data(_))
        ));

        let negative: get_total_products::ResponseData =
            serde_json::from_value(serde_json::json!({ "totalProducts": -1 })).unwrap();
        assert!(matches!(
            convert_total_count(negative),
            Err(SourceError::Data(_))
        ));
    }

    #[test]
    fn test_non_numeric_total_count_does_not_parse() {
        let text = serde_json::from_value::<get_total_products::ResponseData>(
            serde_json::json!({ "totalProducts": "25" }),
        );
        assert!(text.is_err());
    }

    #[test]
    fn test_convert_product_lookup() {
        let data: get_product_by_id::ResponseData =
            serde_json::from_value(serde_json::json!({ "product": null })).unwrap();
        assert_eq!(convert_product_lookup(data).unwrap(), None);

        let data: get_product_by_id::ResponseData = serde_json::from_value(serde_json::json!({
            "product": {
                "id": "cHJvZHVjdDo1NTU=",
                "databaseId": 555,
                "name": "Scarf",
                "price": "$1,299.00",
                "productCategories": { "nodes": [] },
                "image": null
            }
        }))
        .unwrap();
        let product = convert_product_lookup(data).unwrap().unwrap();
        assert_eq!(product.product_id, ProductId::new(555));
        assert_eq!(product.price.to_string(), "$1299.00");
        assert_eq!(product.cursor, None);
    }
}
