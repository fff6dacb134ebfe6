//! Cart permalinks: the checkout URL used when the Storefront API is
//! unavailable.
//!
//! `https://{shop}/cart/{variant}:{qty},{variant}:{qty}?discount={code}`

use url::form_urlencoded::byte_serialize;

use super::CartLine;

/// Build a cart permalink. The `discount` query is only added when a code exists.
#[must_use]
pub fn cart_permalink(shop_domain: &str, lines: &[CartLine], discount_code: Option<&str>) -> String {
    let items = lines
        .iter()
        .map(|line| format!("{}:{}", line.variant_id, line.quantity))
        .collect::<Vec<_>>()
        .join(",");

    let mut url = format!("https://{shop_domain}/cart/{items}");

    if let Some(code) = discount_code.filter(|c| !c.is_empty()) {
        url.push_str("?discount=");
        url.extend(byte_serialize(code.as_bytes()));
    }

    url
}

#[cfg(test)]
mod tests {
    use tierline_core::ShopifyVariantId;

    use super::*;

    fn line(id: i64, quantity: u32) -> CartLine {
        CartLine {
            variant_id: ShopifyVariantId::new(id),
            quantity,
        }
    }

    #[test]
    fn test_permalink_with_code() {
        let url = cart_permalink(
            "acme.myshopify.com",
            &[line(111, 2), line(222, 10)],
            Some("B2B-7KQ2M9XR4T"),
        );
        assert_eq!(
            url,
            "https://acme.myshopify.com/cart/111:2,222:10?discount=B2B-7KQ2M9XR4T"
        );
    }

    #[test]
    fn test_permalink_without_code_has_no_query() {
        let url = cart_permalink("acme.myshopify.com", &[line(111, 1)], None);
        assert_eq!(url, "https://acme.myshopify.com/cart/111:1");
    }

    #[test]
    fn test_permalink_encodes_code() {
        let url = cart_permalink("acme.myshopify.com", &[line(1, 1)], Some("A B&C"));
        assert!(url.ends_with("?discount=A+B%26C"));
    }
}
