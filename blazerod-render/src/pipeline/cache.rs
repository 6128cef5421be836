//! Pipeline variant cache
//!
//! Compiled pipelines keyed by material descriptor, then by variant bits.

use hashbrown::HashMap;

use crate::material::MaterialDescriptor;

/// Cache for compiled pipeline variants
///
/// Pipelines are created on demand and reused across frames until
/// [`clear`](Self::clear) is called when the renderer closes.
pub struct PipelineVariantCache<P> {
    variants: HashMap<MaterialDescriptor, HashMap<u32, P>>,
}

impl<P> Default for PipelineVariantCache<P> {
    fn default() -> Self {
        Self {
            variants: HashMap::new(),
        }
    }
}

impl<P> PipelineVariantCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the pipeline for `descriptor` with variant `bits`
    ///
    /// `create` runs at most once per key.
    pub fn get_or_create(
        &mut self,
        descriptor: MaterialDescriptor,
        bits: u32,
        create: impl FnOnce() -> P,
    ) -> &P {
        let variants = self.variants.entry(descriptor).or_default();

        // Return existing pipeline if cached
        if variants.contains_key(&bits) {
            return &variants[&bits];
        }

        tracing::debug!(
            "Creating pipeline variant: material={}, bits={:#06b}",
            descriptor,
            bits
        );
        variants.insert(bits, create());
        &variants[&bits]
    }

    pub fn get(&self, descriptor: MaterialDescriptor, bits: u32) -> Option<&P> {
        self.variants.get(&descriptor)?.get(&bits)
    }

    pub fn contains(&self, descriptor: MaterialDescriptor, bits: u32) -> bool {
        self.get(descriptor, bits).is_some()
    }

    /// Number of cached pipelines across all descriptors
    pub fn len(&self) -> usize {
        self.variants.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached pipeline
    pub fn clear(&mut self) {
        self.variants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_returns_same_pipeline() {
        let mut cache = PipelineVariantCache::new();
        let mut created = 0;

        let first = *cache.get_or_create(MaterialDescriptor::Vanilla, 0b10, || {
            created += 1;
            created
        });
        let second = *cache.get_or_create(MaterialDescriptor::Vanilla, 0b10, || {
            created += 1;
            created
        });
        assert_eq!(first, second);
        assert_eq!(created, 1);
    }

    #[test]
    fn test_distinct_bits_and_descriptors_are_distinct() {
        let mut cache = PipelineVariantCache::new();
        cache.get_or_create(MaterialDescriptor::Vanilla, 0, || "vanilla");
        cache.get_or_create(MaterialDescriptor::Vanilla, 1, || "vanilla_double_sided");
        cache.get_or_create(MaterialDescriptor::Unlit, 0, || "unlit");

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(MaterialDescriptor::Vanilla, 1), Some(&"vanilla_double_sided"));
        assert!(!cache.contains(MaterialDescriptor::Unlit, 1));
    }

    #[test]
    fn test_clear_empties_cache() {
        let mut cache = PipelineVariantCache::new();
        cache.get_or_create(MaterialDescriptor::Unlit, 4, || ());
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(MaterialDescriptor::Unlit, 4));
    }
}
