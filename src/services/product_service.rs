use crate::{
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    error::{AppError, AppResult},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::ProductQuery,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let category = query.category.as_deref().filter(|c| !c.is_empty());

    let total: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM products WHERE ($1::text IS NULL OR category = $1)",
    )
    .bind(category)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<Product> = sqlx::query_as(
        r#"
        SELECT * FROM products
        WHERE ($1::text IS NULL OR category = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(category)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: i64) -> AppResult<ApiResponse<Product>> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    match product {
        Some(p) => Ok(ApiResponse::success("Product", p, None)),
        None => Err(AppError::NotFound),
    }
}

pub async fn create_product(
    state: &AppState,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    validate_product_fields(&payload.name, &payload.description, payload.price, &payload.category)?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (name, description, price, image_url, category, stock_quantity)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(truncate(&payload.name, 255))
    .bind(truncate(&payload.description, 1000))
    .bind(payload.price)
    .bind(payload.image_url.as_deref().map(|u| truncate(u, 500)))
    .bind(truncate(&payload.category, 100))
    .bind(payload.stock_quantity.unwrap_or(0))
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description).unwrap_or_default();
    let price = payload.price.unwrap_or(existing.price);
    let image_url = payload.image_url.or(existing.image_url);
    let category = payload.category.or(existing.category).unwrap_or_default();
    let stock_quantity = payload.stock_quantity.unwrap_or(existing.stock_quantity);

    validate_product_fields(&name, &description, price, &category)?;
    if stock_quantity < 0 {
        return Err(AppError::BadRequest("stock_quantity cannot be negative".into()));
    }

    let product: Product = sqlx::query_as(
        r#"
        UPDATE products
        SET name = $2, description = $3, price = $4, image_url = $5, category = $6, stock_quantity = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(truncate(&name, 255))
    .bind(truncate(&description, 1000))
    .bind(price)
    .bind(image_url.as_deref().map(|u| truncate(u, 500)))
    .bind(truncate(&category, 100))
    .bind(stock_quantity)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Updated",
        product,
        Some(Meta::empty()),
    ))
}

/// Products referenced by order items stay: delete them and order history
/// loses its price snapshots' referent.
pub async fn delete_product(state: &AppState, id: i64) -> AppResult<()> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    let referenced: (i64,) =
        sqlx::query_as("SELECT count(*) FROM order_items WHERE product_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;
    if referenced.0 > 0 {
        return Err(AppError::BadRequest(
            "cannot delete a product that has been ordered; mark it out of stock instead".into(),
        ));
    }

    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    Ok(())
}

fn validate_product_fields(
    name: &str,
    description: &str,
    price: i64,
    category: &str,
) -> Result<(), AppError> {
    if name.trim().is_empty() || description.trim().is_empty() || category.trim().is_empty() {
        return Err(AppError::BadRequest(
            "missing required fields: name, description, category".into(),
        ));
    }
    if price <= 0 {
        return Err(AppError::BadRequest("price must be positive".into()));
    }
    Ok(())
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
