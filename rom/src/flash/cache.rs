// Licensed under the Apache-2.0 license

/// Control over the read cache sitting in front of memory-mapped flash.
pub trait FlashCache {
    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);
}

/// Keeps the flash read cache disabled for as long as it lives, then puts it
/// back the way it was found.
pub struct CacheGuard<'a> {
    cache: &'a dyn FlashCache,
    restore: bool,
}

impl<'a> CacheGuard<'a> {
    pub fn disable(cache: &'a dyn FlashCache) -> Self {
        let restore = cache.is_enabled();
        if restore {
            cache.set_enabled(false);
        }
        CacheGuard { cache, restore }
    }
}

impl Drop for CacheGuard<'_> {
    fn drop(&mut self) {
        if self.restore {
            self.cache.set_enabled(true);
        }
    }
}
