use crate::{
    entities::product::{self, Entity as Product, Model as ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const MAX_PRODUCT_IMAGES: usize = 3;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub price: i64,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
}

/// Catalog CRUD plus the stock decrement used by order reconciliation.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn validate_images(images: &[String]) -> Result<(), ServiceError> {
        if images.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one image is required".to_string(),
            ));
        }
        if images.len() > MAX_PRODUCT_IMAGES {
            return Err(ServiceError::ValidationError(
                "Maximum three images allowed".to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        Self::validate_images(&input.images)?;

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            category: Set(input.category),
            images: Set(serde_json::to_value(&input.images)?),
            ..Default::default()
        };

        let created = model.insert(&*self.db).await?;
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let found = self.get_product(product_id).await?;

        if let Some(price) = input.price {
            if price <= 0 {
                return Err(ServiceError::ValidationError(
                    "Price must be positive".to_string(),
                ));
            }
        }
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "Stock cannot be negative".to_string(),
                ));
            }
        }
        if let Some(images) = &input.images {
            Self::validate_images(images)?;
        }

        let mut active: product::ActiveModel = found.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(images) = input.images {
            active.images = Set(serde_json::to_value(&images)?);
        }

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let found = self.get_product(product_id).await?;
        found.delete(&*self.db).await?;
        info!("product deleted");
        Ok(())
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn find_product(&self, product_id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(product_id).one(&*self.db).await?)
    }

    /// All products, newest first.
    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_products(&self) -> Result<u64, ServiceError> {
        Ok(Product::find().count(&*self.db).await?)
    }

    /// Decrements stock by `quantity` in a single statement. The caller has
    /// already validated availability; between that check and this update a
    /// concurrent checkout can oversell — an accepted gap for this shop's
    /// traffic, recorded in DESIGN.md.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn decrement_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(
                product::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!("stock decrement targeted a missing product");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_is_bounded() {
        assert!(ProductCatalogService::validate_images(&[]).is_err());
        assert!(ProductCatalogService::validate_images(&["a".into()]).is_ok());
        assert!(ProductCatalogService::validate_images(&[
            "a".into(),
            "b".into(),
            "c".into()
        ])
        .is_ok());
        assert!(ProductCatalogService::validate_images(&[
            "a".into(),
            "b".into(),
            "c".into(),
            "d".into()
        ])
        .is_err());
    }

    #[test]
    fn create_input_validation() {
        let input = CreateProductInput {
            name: "Palito de queso".into(),
            description: "Crujiente".into(),
            price: 0,
            stock: 10,
            category: "snacks".into(),
            images: vec!["https://img.example/1.jpg".into()],
        };
        assert!(input.validate().is_err());
    }
}
