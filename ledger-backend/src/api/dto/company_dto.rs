// src/api/dto/company_dto.rs

use crate::repository::company_repository::CreateCompany;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 会社作成リクエスト
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,

    #[validate(nested)]
    pub address: AddressDto,

    #[validate(nested)]
    pub contact: ContactDto,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddressDto {
    #[validate(length(min = 1, max = 200, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 100, message = "Country is required"))]
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ContactDto {
    #[validate(length(min = 1, max = 200, message = "Contact name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

impl From<CreateCompanyRequest> for CreateCompany {
    fn from(request: CreateCompanyRequest) -> Self {
        Self {
            name: request.name,
            street: request.address.street,
            city: request.address.city,
            state: request.address.state,
            postal_code: request.address.postal_code,
            country: request.address.country,
            contact_name: request.contact.name,
            contact_email: request.contact.email,
            contact_phone: request.contact.phone,
        }
    }
}
