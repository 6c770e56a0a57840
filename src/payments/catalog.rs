use serde::{Deserialize, Serialize};

/// Currency the catalog is priced in.
pub const CATALOG_CURRENCY: &str = "KSh";

/// A purchasable bundle of credits. Prices are in minor units of
/// [`CATALOG_CURRENCY`] (whole shillings for M-Pesa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    pub id: u32,
    pub credit_amount: u32,
    pub price_minor_units: u64,
    pub label: String,
    pub is_featured: bool,
}

impl CreditPackage {
    /// Price per credit with one decimal, the way the purchase screen shows it.
    pub fn price_per_credit(&self) -> String {
        let tenths = (self.price_minor_units * 10 + u64::from(self.credit_amount) / 2)
            / u64::from(self.credit_amount);
        format!("{}.{}", tenths / 10, tenths % 10)
    }
}

#[derive(Debug, Clone)]
pub struct PackageCatalog {
    packages: Vec<CreditPackage>,
}

impl PackageCatalog {
    /// Builds a catalog, skipping entries with a zero credit amount or price.
    pub fn new(packages: Vec<CreditPackage>) -> Self {
        let packages = packages
            .into_iter()
            .filter(|p| p.credit_amount > 0 && p.price_minor_units > 0)
            .collect();
        Self { packages }
    }

    pub fn packages(&self) -> &[CreditPackage] {
        &self.packages
    }

    pub fn find(&self, id: u32) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn featured(&self) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.is_featured)
    }
}

impl Default for PackageCatalog {
    fn default() -> Self {
        let entry = |id, credit_amount, price_minor_units, label: &str, is_featured| CreditPackage {
            id,
            credit_amount,
            price_minor_units,
            label: label.to_string(),
            is_featured,
        };
        Self::new(vec![
            entry(1, 50, 500, "Starter Pack", false),
            entry(2, 100, 900, "Popular Choice", true),
            entry(3, 200, 1600, "Power User", false),
            entry(4, 500, 3500, "Pro Level", false),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_one_featured_package() {
        let catalog = PackageCatalog::default();
        assert_eq!(catalog.packages().len(), 4);
        let featured = catalog.featured().expect("featured package");
        assert_eq!(featured.credit_amount, 100);
        assert_eq!(featured.price_minor_units, 900);
    }

    #[test]
    fn find_by_id() {
        let catalog = PackageCatalog::default();
        assert_eq!(catalog.find(4).map(|p| p.credit_amount), Some(500));
        assert!(catalog.find(99).is_none());
    }

    #[test]
    fn price_per_credit_is_rounded_to_one_decimal() {
        let catalog = PackageCatalog::default();
        let shown: Vec<String> = catalog
            .packages()
            .iter()
            .map(CreditPackage::price_per_credit)
            .collect();
        assert_eq!(shown, vec!["10.0", "9.0", "8.0", "7.0"]);

        let odd = CreditPackage {
            id: 9,
            credit_amount: 3,
            price_minor_units: 10,
            label: "odd".to_string(),
            is_featured: false,
        };
        assert_eq!(odd.price_per_credit(), "3.3");
    }

    #[test]
    fn zero_valued_packages_are_dropped() {
        let catalog = PackageCatalog::new(vec![CreditPackage {
            id: 1,
            credit_amount: 0,
            price_minor_units: 100,
            label: "broken".to_string(),
            is_featured: false,
        }]);
        assert!(catalog.packages().is_empty());
    }
}
