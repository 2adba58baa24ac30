use crate::{
    entities::customer::{self, DocumentType, Entity as Customer, Gender, Model as CustomerModel},
    entities::customer_address::{self, Entity as CustomerAddress, Model as AddressModel},
    entities::product::{Entity as Product, Model as ProductModel},
    entities::wishlist_item::{self, Entity as WishlistItem},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "Label is required"))]
    pub label: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Street address is required"))]
    pub street_address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone_number: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAddressInput {
    pub label: Option<String>,
    pub full_name: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub phone_number: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileInput {
    pub document_type: Option<DocumentType>,
    pub document_number: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<DateTime<Utc>>,
}

/// Customer self-service: addresses, wishlist, profile, preferences.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Clears the default flag on every address of this customer. Called
    /// before a new default is written so at most one survives.
    async fn unset_default_addresses(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        CustomerAddress::update_many()
            .col_expr(customer_address::Column::IsDefault, Expr::value(false))
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn add_address(
        &self,
        customer_id: Uuid,
        input: AddressInput,
    ) -> Result<Vec<AddressModel>, ServiceError> {
        input.validate()?;

        if input.is_default {
            self.unset_default_addresses(customer_id).await?;
        }

        let address = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            label: Set(input.label),
            full_name: Set(input.full_name),
            street_address: Set(input.street_address),
            city: Set(input.city),
            phone_number: Set(input.phone_number),
            is_default: Set(input.is_default),
            created_at: Set(Utc::now()),
        };
        address.insert(&*self.db).await?;

        self.list_addresses(customer_id).await
    }

    pub async fn list_addresses(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<AddressModel>, ServiceError> {
        Ok(CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_asc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(customer_id = %customer_id, address_id = %address_id))]
    pub async fn update_address(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
        input: UpdateAddressInput,
    ) -> Result<Vec<AddressModel>, ServiceError> {
        let address = CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        if input.is_default == Some(true) {
            self.unset_default_addresses(customer_id).await?;
        }

        let mut active: customer_address::ActiveModel = address.into();
        if let Some(label) = input.label {
            active.label = Set(label);
        }
        if let Some(full_name) = input.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(street_address) = input.street_address {
            active.street_address = Set(street_address);
        }
        if let Some(city) = input.city {
            active.city = Set(city);
        }
        if let Some(phone_number) = input.phone_number {
            active.phone_number = Set(phone_number);
        }
        if let Some(is_default) = input.is_default {
            active.is_default = Set(is_default);
        }
        active.update(&*self.db).await?;

        self.list_addresses(customer_id).await
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %address_id))]
    pub async fn delete_address(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<Vec<AddressModel>, ServiceError> {
        let address = CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        let active: customer_address::ActiveModel = address.into();
        active.delete(&*self.db).await?;

        self.list_addresses(customer_id).await
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn add_to_wishlist(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let existing = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerId.eq(customer_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                "Product already in wishlist".to_string(),
            ));
        }

        let item = wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            product_id: Set(product_id),
            added_at: Set(Utc::now()),
        };
        item.insert(&*self.db).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn remove_from_wishlist(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let existing = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerId.eq(customer_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("Product not found in wishlist".to_string())
            })?;

        let active: wishlist_item::ActiveModel = existing.into();
        active.delete(&*self.db).await?;

        Ok(())
    }

    /// Wishlisted products with full product details, oldest first.
    pub async fn wishlist_products(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<ProductModel>, ServiceError> {
        let items = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerId.eq(customer_id))
            .order_by_asc(wishlist_item::Column::AddedAt)
            .all(&*self.db)
            .await?;

        let mut products = Vec::with_capacity(items.len());
        for item in items {
            if let Some(product) = Product::find_by_id(item.product_id).one(&*self.db).await? {
                products.push(product);
            }
        }
        Ok(products)
    }

    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn update_profile(
        &self,
        customer_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<CustomerModel, ServiceError> {
        if let Some(dob) = input.date_of_birth {
            if dob > Utc::now() {
                return Err(ServiceError::ValidationError(
                    "La fecha de nacimiento no puede ser futura".to_string(),
                ));
            }
        }

        let found = self.get_customer(customer_id).await?;
        let mut active: customer::ActiveModel = found.into();

        if let Some(document_type) = input.document_type {
            active.document_type = Set(Some(document_type));
        }
        if let Some(document_number) = input.document_number {
            active.document_number = Set(Some(document_number.trim().to_string()));
        }
        if let Some(gender) = input.gender {
            active.gender = Set(Some(gender));
        }
        if let Some(dob) = input.date_of_birth {
            active.date_of_birth = Set(Some(dob));
        }

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn update_notification_preferences(
        &self,
        customer_id: Uuid,
        email_notifications: Option<bool>,
        marketing_emails: Option<bool>,
    ) -> Result<CustomerModel, ServiceError> {
        let found = self.get_customer(customer_id).await?;
        let mut active: customer::ActiveModel = found.into();

        if let Some(flag) = email_notifications {
            active.email_notifications = Set(flag);
        }
        if let Some(flag) = marketing_emails {
            active.marketing_emails = Set(flag);
        }

        Ok(active.update(&*self.db).await?)
    }

    /// Self-service deactivation; the auth layer rejects inactive customers
    /// from then on.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn deactivate(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        self.set_active(customer_id, false).await?;
        Ok(())
    }

    /// Admin toggle for customer access.
    #[instrument(skip(self), fields(customer_id = %customer_id, is_active = is_active))]
    pub async fn set_active(
        &self,
        customer_id: Uuid,
        is_active: bool,
    ) -> Result<CustomerModel, ServiceError> {
        let found = self.get_customer(customer_id).await?;
        let mut active: customer::ActiveModel = found.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db).await?;

        info!("customer active flag updated");
        Ok(updated)
    }

    /// Caches the payment gateway's customer handle.
    pub async fn set_gateway_customer_id(
        &self,
        customer_id: Uuid,
        gateway_customer_id: &str,
    ) -> Result<(), ServiceError> {
        let found = self.get_customer(customer_id).await?;
        let mut active: customer::ActiveModel = found.into();
        active.gateway_customer_id = Set(Some(gateway_customer_id.to_string()));
        active.update(&*self.db).await?;
        Ok(())
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> Result<CustomerModel, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    /// Admin roster, newest first.
    pub async fn list_customers(&self) -> Result<Vec<CustomerModel>, ServiceError> {
        Ok(Customer::find()
            .order_by_desc(customer::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_customers(&self) -> Result<u64, ServiceError> {
        Ok(Customer::find().count(&*self.db).await?)
    }
}
