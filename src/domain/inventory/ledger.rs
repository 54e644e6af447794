use super::errors::InventoryError;
use super::value_objects::{Product, StockMovement};

// ============================================================================
// Product Inventory Ledger
// ============================================================================
//
// The only place stock_quantity / sales_count / in_stock change.
// Callers hold the product row lock for the whole order transaction, so the
// check and the write below happen against a value nobody else can move.
//
// ============================================================================

/// Take `quantity` units out of managed stock.
///
/// Unmanaged products always pass and are left untouched.
pub fn reserve(product: &mut Product, quantity: i32) -> Result<StockMovement, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }

    if !product.manage_stock {
        return Ok(unchanged(product, quantity));
    }

    if product.stock_quantity < quantity {
        return Err(InventoryError::InsufficientStock {
            product_id: product.id,
            product_name: product.name.clone(),
            requested: quantity,
            available: product.stock_quantity,
        });
    }

    let sales_after = product
        .sales_count
        .checked_add(quantity)
        .ok_or(InventoryError::InvalidQuantity(quantity))?;

    product.stock_quantity -= quantity;
    product.sales_count = sales_after;
    product.in_stock = product.stock_quantity > 0;

    tracing::debug!(
        product_id = %product.id,
        quantity = quantity,
        stock_after = product.stock_quantity,
        "Reserved stock"
    );

    Ok(applied(product, quantity))
}

/// Put `quantity` units back into managed stock.
///
/// `sales_count` never drops below zero; if it would, it is clamped and the
/// mismatch is logged.
pub fn release(product: &mut Product, quantity: i32) -> Result<StockMovement, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }

    if !product.manage_stock {
        return Ok(unchanged(product, quantity));
    }

    product.stock_quantity = product
        .stock_quantity
        .checked_add(quantity)
        .ok_or(InventoryError::InvalidQuantity(quantity))?;

    if product.sales_count < quantity {
        tracing::warn!(
            product_id = %product.id,
            sales_count = product.sales_count,
            quantity = quantity,
            "Sales count lower than released quantity, clamping at zero"
        );
        product.sales_count = 0;
    } else {
        product.sales_count -= quantity;
    }

    product.in_stock = product.stock_quantity > 0;

    tracing::debug!(
        product_id = %product.id,
        quantity = quantity,
        stock_after = product.stock_quantity,
        "Released stock"
    );

    Ok(applied(product, quantity))
}

fn applied(product: &Product, quantity: i32) -> StockMovement {
    StockMovement {
        product_id: product.id,
        quantity,
        applied: true,
        stock_after: product.stock_quantity,
        sales_after: product.sales_count,
    }
}

fn unchanged(product: &Product, quantity: i32) -> StockMovement {
    StockMovement {
        applied: false,
        ..applied(product, quantity)
    }
}
