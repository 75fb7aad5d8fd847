use slotmap::{Key, SlotMap};

/// Handle-keyed storage for one asset type.
///
/// Assets are owned by value; the renderer borrows them for the duration of a
/// frame and keeps its own GPU-side tables keyed by the same handles.
pub struct AssetStorage<H: Key, T> {
    map: SlotMap<H, T>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: SlotMap::with_key(),
        }
    }

    /// Adds an asset and returns its handle.
    pub fn add(&mut self, asset: impl Into<T>) -> H {
        self.map.insert(asset.into())
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.map.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.map.get_mut(handle)
    }

    /// Removes the CPU-side asset. GPU resources must be released through the
    /// renderer's `deallocate_*` calls before this.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.map.remove(handle)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.map.contains_key(handle)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.map.iter()
    }
}

impl<H: Key, T> std::ops::Index<H> for AssetStorage<H, T> {
    type Output = T;

    fn index(&self, handle: H) -> &T {
        &self.map[handle]
    }
}
