// 🏷️ Item Catalog - fixed tag → item table, defined at startup
//
// Items are immutable for the whole session. Lookup is an exact match on the
// tag fingerprint; there is no fuzzy or partial matching.
//
// Catalog constraint: display names travel unescaped inside protocol frames,
// so they must not contain ',' or ';'. Loading does not reject such names
// (the paired node would still expect them verbatim), it only warns.

use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// TAG FINGERPRINT
// ============================================================================

/// Opaque tag fingerprint as read from the tag reader (e.g. a 4-byte UID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(Vec<u8>);

impl TagId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        TagId(bytes.into())
    }

    /// Parse a hex string, ignoring spaces and ':' separators ("DE:AD:BE:EF")
    pub fn from_hex(text: &str) -> Option<Self> {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        if compact.is_empty() {
            return None;
        }
        hex::decode(compact).ok().map(TagId)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

// ============================================================================
// ITEM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub tag: TagId,

    /// Display name, also the item's identity on the wire
    pub name: String,

    /// Non-negative unit price
    pub unit_price: Decimal,
}

impl Item {
    pub fn new(tag: TagId, name: &str, unit_price: Decimal) -> Self {
        Item {
            tag,
            name: name.to_string(),
            unit_price,
        }
    }

    /// True when the name can travel in a frame without being misread
    pub fn is_wire_safe(&self) -> bool {
        !self.name.contains(',') && !self.name.contains(';')
    }
}

/// Raw CSV row: `tag,name,price`
#[derive(Debug, Deserialize)]
struct CatalogRow {
    tag: String,
    name: String,
    price: String,
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Self {
        for item in items.iter().filter(|item| !item.is_wire_safe()) {
            tracing::warn!(name = %item.name, "catalog name contains a frame delimiter");
        }
        Catalog { items }
    }

    /// Built-in demo catalog
    pub fn demo() -> Self {
        Catalog::new(vec![
            Item::new(TagId::new([0x93, 0x4A, 0x1F, 0x2C]), "Egg", Decimal::new(2500, 2)),
            Item::new(TagId::new([0x53, 0x8B, 0x22, 0x1A]), "Milk", Decimal::new(4000, 2)),
            Item::new(TagId::new([0xA3, 0x10, 0x7E, 0x05]), "Bread", Decimal::new(3550, 2)),
            Item::new(TagId::new([0xE3, 0xC4, 0x91, 0x6B]), "Rice", Decimal::new(6000, 2)),
        ])
    }

    /// Load a catalog from a CSV file with a `tag,name,price` header
    pub fn from_csv_path(path: &Path) -> Result<Self, ConfigError> {
        let reader = csv::Reader::from_path(path).map_err(|source| ConfigError::Catalog {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_csv(reader, &path.display().to_string())
    }

    pub fn from_csv_reader<R: Read>(input: R) -> Result<Self, ConfigError> {
        Self::from_csv(csv::Reader::from_reader(input), "<reader>")
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, origin: &str) -> Result<Self, ConfigError> {
        let mut items = Vec::new();

        for (index, result) in reader.deserialize::<CatalogRow>().enumerate() {
            let row_number = index + 1;
            let row = result.map_err(|source| ConfigError::Catalog {
                path: origin.to_string(),
                source,
            })?;

            let tag = TagId::from_hex(&row.tag).ok_or_else(|| ConfigError::InvalidTag {
                row: row_number,
                tag: row.tag.clone(),
            })?;
            let price = Decimal::from_str(row.price.trim()).map_err(|_| ConfigError::InvalidPrice {
                row: row_number,
                price: row.price.clone(),
            })?;
            if price.is_sign_negative() && !price.is_zero() {
                return Err(ConfigError::NegativePrice {
                    row: row_number,
                    name: row.name,
                });
            }

            items.push(Item::new(tag, row.name.trim(), price));
        }

        tracing::info!(origin, items = items.len(), "catalog loaded");
        Ok(Catalog::new(items))
    }

    /// Exact-match lookup of a tag fingerprint
    pub fn identify(&self, tag: &TagId) -> Option<usize> {
        self.items.iter().position(|item| &item.tag == tag)
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Unit price for a wire name; unknown names price at zero
    pub fn price_of(&self, name: &str) -> Decimal {
        self.find_by_name(name)
            .map(|item| item.unit_price)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::demo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tag_hex_roundtrip() {
        let tag = TagId::from_hex("de:ad:be:ef").unwrap();
        assert_eq!(tag.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(tag.to_string(), "DEADBEEF");
        assert_eq!(TagId::from_hex("DE AD BE EF"), Some(tag));
    }

    #[test]
    fn test_tag_hex_rejects_garbage() {
        assert!(TagId::from_hex("").is_none());
        assert!(TagId::from_hex("xyz").is_none());
        assert!(TagId::from_hex("ABC").is_none()); // odd length
    }

    #[test]
    fn test_identify_exact_match_only() {
        let catalog = Catalog::demo();
        let egg = TagId::new([0x93, 0x4A, 0x1F, 0x2C]);

        assert_eq!(catalog.identify(&egg), Some(0));
        assert_eq!(catalog.identify(&TagId::new([0x93, 0x4A, 0x1F])), None);
        assert_eq!(catalog.identify(&TagId::new([0x93, 0x4A, 0x1F, 0x2C, 0x00])), None);
    }

    #[test]
    fn test_price_of_unknown_is_zero() {
        let catalog = Catalog::demo();
        assert_eq!(catalog.price_of("Milk"), dec!(40.00));
        assert_eq!(catalog.price_of("Caviar"), Decimal::ZERO);
    }

    #[test]
    fn test_load_from_csv() {
        let data = "tag,name,price\n01020304,Apple,12.50\nAA:BB:CC:DD,Pear,3\n";
        let catalog = Catalog::from_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.items()[0].name, "Apple");
        assert_eq!(catalog.items()[0].unit_price, dec!(12.50));
        assert_eq!(catalog.identify(&TagId::new([0xAA, 0xBB, 0xCC, 0xDD])), Some(1));
    }

    #[test]
    fn test_example_catalog_matches_demo() {
        let catalog = Catalog::from_csv_reader(include_str!("../catalog.example.csv").as_bytes()).unwrap();
        assert_eq!(catalog, Catalog::demo());
    }

    #[test]
    fn test_load_from_csv_rejects_bad_rows() {
        let bad_tag = "tag,name,price\nnothex,Apple,1\n";
        assert!(matches!(
            Catalog::from_csv_reader(bad_tag.as_bytes()),
            Err(ConfigError::InvalidTag { row: 1, .. })
        ));

        let bad_price = "tag,name,price\n01,Apple,cheap\n";
        assert!(matches!(
            Catalog::from_csv_reader(bad_price.as_bytes()),
            Err(ConfigError::InvalidPrice { row: 1, .. })
        ));

        let negative = "tag,name,price\n01,Apple,-2\n";
        assert!(matches!(
            Catalog::from_csv_reader(negative.as_bytes()),
            Err(ConfigError::NegativePrice { row: 1, .. })
        ));
    }

    #[test]
    fn test_delimiter_names_are_kept() {
        let catalog = Catalog::new(vec![Item::new(TagId::new([1]), "Salt;Pepper", dec!(1))]);
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.items()[0].is_wire_safe());
    }
}
