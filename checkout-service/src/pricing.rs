use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CheckoutError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceSource {
    Retailer,
    Customer,
}

/// The price a customer should be charged for a variant right now.
/// `wholesale_price` is present only when the retailer override applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePrice {
    pub unit_price: BigDecimal,
    pub source: PriceSource,
    pub wholesale_price: Option<BigDecimal>,
}

/// Retailer a customer is linked to through a referral record, if any.
pub async fn customer_linked_retailer(db: &PgPool, customer_id: Uuid) -> CoreResult<Option<Uuid>> {
    let retailer = sqlx::query_scalar::<_, Uuid>(
        "SELECT retailer_id FROM customer_referrals WHERE customer_id = $1",
    )
    .bind(customer_id)
    .fetch_optional(db)
    .await?;
    Ok(retailer)
}

/// Resolve the unit price to charge for a variant. Pure read, no side effects.
///
/// A customer linked to a retailer with an active price override gets the
/// retailer selling price (falling back to the wholesale price); everyone
/// else gets the most recent active standard customer price.
pub async fn resolve_effective_price(
    db: &PgPool,
    variant_id: Uuid,
    customer_id: Option<Uuid>,
) -> CoreResult<EffectivePrice> {
    let retailer_id = match customer_id {
        Some(id) => customer_linked_retailer(db, id).await?,
        None => None,
    };

    if let Some(retailer_id) = retailer_id {
        let row = sqlx::query_as::<_, (Option<BigDecimal>, Option<BigDecimal>)>(
            r#"SELECT wholesale_price, retailer_selling_price
               FROM retailer_variant_prices
               WHERE retailer_id = $1 AND variant_id = $2 AND is_active
               ORDER BY effective_from DESC
               LIMIT 1"#,
        )
        .bind(retailer_id)
        .bind(variant_id)
        .fetch_optional(db)
        .await?;

        if let Some((wholesale, selling)) = row {
            if let Some(unit_price) = selling.clone().or_else(|| wholesale.clone()) {
                return Ok(EffectivePrice {
                    unit_price,
                    source: PriceSource::Retailer,
                    wholesale_price: wholesale,
                });
            }
        }
    }

    let standard = sqlx::query_scalar::<_, BigDecimal>(
        r#"SELECT price FROM variant_prices
           WHERE variant_id = $1 AND price_type = 'CUSTOMER' AND is_active
           ORDER BY effective_from DESC
           LIMIT 1"#,
    )
    .bind(variant_id)
    .fetch_optional(db)
    .await?;

    match standard {
        Some(unit_price) => Ok(EffectivePrice {
            unit_price,
            source: PriceSource::Customer,
            wholesale_price: None,
        }),
        None => Err(CheckoutError::PriceNotFound { variant_id }),
    }
}
