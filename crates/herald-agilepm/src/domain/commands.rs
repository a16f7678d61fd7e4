//! Commands for the Agile PM context.

use uuid::Uuid;

/// Command to create a new product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new product.
    pub product_id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Command to rename a product.
#[derive(Debug, Clone)]
pub struct RenameProduct {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The product to rename.
    pub product_id: Uuid,
    /// The new name.
    pub name: String,
}

/// Command to plan a backlog item for a product.
#[derive(Debug, Clone)]
pub struct PlanBacklogItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The owning product.
    pub product_id: Uuid,
    /// One-line summary of the work.
    pub summary: String,
}
