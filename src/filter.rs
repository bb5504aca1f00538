//! Collision-class allocation for layers.
//!
//! Every layer occupies one collision class out of a fixed budget of
//! [`MAX_LAYERS`]. Model footprints select which layers they physically
//! interact with by composing the category bits of the named layers.

use crate::error::ConfigError;

/// Maximum number of collision classes (one per layer).
pub const MAX_LAYERS: usize = 16;

/// Identifier of an allocated collision class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u8);

impl LayerId {
    /// The category bit of this collision class.
    #[must_use]
    pub fn bit(self) -> u16 {
        1 << self.0
    }

    /// Raw index of the class (0-based allocation order).
    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }
}

/// Allocates and tracks collision classes by layer name.
#[derive(Debug, Default)]
pub struct CollisionFilterRegistry {
    layers: Vec<String>,
}

impl CollisionFilterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the collision-class budget is exhausted.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.layers.len() >= MAX_LAYERS
    }

    /// Number of allocated classes.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Allocate a collision class for a layer.
    ///
    /// # Errors
    ///
    /// Fails when the budget is exhausted or the name is already registered.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register_layer(&mut self, name: &str) -> Result<LayerId, ConfigError> {
        if self.is_full() {
            return Err(ConfigError::LayersFull { max: MAX_LAYERS });
        }
        if self.layers.iter().any(|n| n == name) {
            return Err(ConfigError::DuplicateLayer(name.to_string()));
        }
        self.layers.push(name.to_string());
        Ok(LayerId((self.layers.len() - 1) as u8))
    }

    /// Look up the collision class of a registered layer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.layers
            .iter()
            .position(|n| n == name)
            .map(|i| LayerId(i as u8))
    }

    /// Compose the category bits of the named layers.
    ///
    /// An empty name list means "all layers".
    ///
    /// # Errors
    ///
    /// Fails when a name was never registered.
    pub fn category_bits(
        &self,
        names: &[String],
        context: &str,
    ) -> Result<u16, ConfigError> {
        if names.is_empty() {
            return Ok(u16::MAX);
        }
        let mut bits = 0u16;
        for name in names {
            let id = self
                .layer_id(name)
                .ok_or_else(|| ConfigError::unknown_layer(name, context))?;
            bits |= id.bit();
        }
        Ok(bits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_order() {
        let mut cfr = CollisionFilterRegistry::new();
        let ground = cfr.register_layer("ground").unwrap();
        let walls = cfr.register_layer("walls").unwrap();
        assert_eq!(ground.bit(), 0b01);
        assert_eq!(walls.bit(), 0b10);
        assert_eq!(cfr.layer_count(), 2);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut cfr = CollisionFilterRegistry::new();
        for i in 0..MAX_LAYERS {
            cfr.register_layer(&format!("layer{i}")).unwrap();
        }
        assert!(cfr.is_full());
        let err = cfr.register_layer("one_too_many").unwrap_err();
        assert!(matches!(err, ConfigError::LayersFull { max: MAX_LAYERS }));
    }

    #[test]
    fn test_duplicate_name() {
        let mut cfr = CollisionFilterRegistry::new();
        cfr.register_layer("ground").unwrap();
        let err = cfr.register_layer("ground").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateLayer(_)));
    }

    #[test]
    fn test_category_bits() {
        let mut cfr = CollisionFilterRegistry::new();
        cfr.register_layer("ground").unwrap();
        cfr.register_layer("walls").unwrap();
        cfr.register_layer("doors").unwrap();

        let bits = cfr
            .category_bits(&["ground".to_string(), "doors".to_string()], "test")
            .unwrap();
        assert_eq!(bits, 0b101);

        // Empty list means all layers.
        assert_eq!(cfr.category_bits(&[], "test").unwrap(), u16::MAX);

        let err = cfr
            .category_bits(&["ceiling".to_string()], "model 'bot1'")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLayer { .. }));
    }
}
