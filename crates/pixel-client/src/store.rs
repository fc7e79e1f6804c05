use pixel_types::events::ChangeEvent;
use pixel_types::models::{PIXELS_TABLE, Pixel};

/// Anything that can change the local grid. Polls, direct refreshes and the
/// changefeed all funnel through this type into [`GridStore::apply`].
#[derive(Debug, Clone)]
pub enum GridUpdate {
    /// A full list-all result.
    Snapshot(Vec<Pixel>),
    /// One pushed row change.
    Change(ChangeEvent),
}

/// Local, eventually-consistent mirror of the pixel table, sorted by id.
///
/// Merge rule: a change replaces the matching record when its version is at
/// least the local one; changes for unknown ids are dropped. A snapshot
/// replaces the whole sequence, except that a local record newer than the
/// snapshot's copy survives.
#[derive(Debug, Default)]
pub struct GridStore {
    pixels: Vec<Pixel>,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn get(&self, id: u32) -> Option<&Pixel> {
        self.position(id).map(|idx| &self.pixels[idx])
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn adopted_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.adopted).count()
    }

    /// True only for a non-empty grid with every pixel adopted.
    pub fn is_fully_adopted(&self) -> bool {
        !self.pixels.is_empty() && self.pixels.iter().all(|p| p.adopted)
    }

    /// Apply one update. Returns whether the visible state changed.
    pub fn apply(&mut self, update: GridUpdate) -> bool {
        match update {
            GridUpdate::Snapshot(pixels) => self.replace(pixels),
            GridUpdate::Change(change) => {
                if change.table != PIXELS_TABLE {
                    return false;
                }
                self.patch(change.new)
            }
        }
    }

    fn replace(&mut self, mut incoming: Vec<Pixel>) -> bool {
        incoming.sort_by_key(|p| p.id);
        incoming.dedup_by_key(|p| p.id);

        for pixel in incoming.iter_mut() {
            if let Some(local) = self.get(pixel.id) {
                if local.version > pixel.version {
                    *pixel = local.clone();
                }
            }
        }

        if incoming == self.pixels {
            return false;
        }
        self.pixels = incoming;
        true
    }

    fn patch(&mut self, pixel: Pixel) -> bool {
        let Some(idx) = self.position(pixel.id) else {
            return false;
        };

        let local = &mut self.pixels[idx];
        if pixel.version < local.version || *local == pixel {
            return false;
        }
        *local = pixel;
        true
    }

    fn position(&self, id: u32) -> Option<usize> {
        self.pixels.binary_search_by_key(&id, |p| p.id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixel_types::events::ChangeKind;

    fn grid(count: u32) -> Vec<Pixel> {
        (0..count).map(Pixel::unadopted).collect()
    }

    fn adopted(id: u32, name: &str, version: u64) -> Pixel {
        Pixel {
            adopted: true,
            adopter: name.to_string(),
            color: "#FF6B6B".to_string(),
            emoji: "😀".to_string(),
            version,
            ..Pixel::unadopted(id)
        }
    }

    fn change(pixel: Pixel) -> GridUpdate {
        GridUpdate::Change(ChangeEvent {
            event_type: ChangeKind::Update,
            table: PIXELS_TABLE.to_string(),
            new: pixel,
        })
    }

    #[test]
    fn snapshot_sorts_and_dedups() {
        let mut store = GridStore::new();
        let mut pixels = grid(4);
        pixels.reverse();
        pixels.push(Pixel::unadopted(2));

        assert!(store.apply(GridUpdate::Snapshot(pixels)));
        let ids: Vec<u32> = store.pixels().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        assert!(!store.apply(GridUpdate::Snapshot(grid(4))));
    }

    #[test]
    fn change_patches_in_place() {
        let mut store = GridStore::new();
        store.apply(GridUpdate::Snapshot(grid(80)));

        assert!(store.apply(change(adopted(5, "Ava", 1))));
        assert_eq!(store.len(), 80);
        let pixel = store.get(5).unwrap();
        assert!(pixel.adopted);
        assert_eq!(pixel.adopter, "Ava");
        assert_eq!(store.adopted_count(), 1);
    }

    #[test]
    fn change_for_unknown_id_is_ignored() {
        let mut store = GridStore::new();
        store.apply(GridUpdate::Snapshot(grid(80)));

        assert!(!store.apply(change(adopted(80, "Ava", 1))));
        assert_eq!(store.len(), 80);
        assert!(store.get(80).is_none());
    }

    #[test]
    fn stale_change_does_not_roll_back() {
        let mut store = GridStore::new();
        store.apply(GridUpdate::Snapshot(grid(10)));
        store.apply(change(adopted(3, "Bo", 2)));

        assert!(!store.apply(change(adopted(3, "Ava", 1))));
        assert_eq!(store.get(3).unwrap().adopter, "Bo");
    }

    #[test]
    fn snapshot_keeps_newer_local_rows() {
        let mut store = GridStore::new();
        store.apply(GridUpdate::Snapshot(grid(10)));
        store.apply(change(adopted(3, "Bo", 1)));

        // A poll that started before the adoption landed.
        store.apply(GridUpdate::Snapshot(grid(10)));
        assert_eq!(store.get(3).unwrap().adopter, "Bo");

        // A later reset carries a higher version and wins.
        let mut reset = grid(10);
        reset[3].version = 2;
        assert!(store.apply(GridUpdate::Snapshot(reset)));
        assert!(!store.get(3).unwrap().adopted);
    }

    #[test]
    fn other_tables_are_ignored() {
        let mut store = GridStore::new();
        store.apply(GridUpdate::Snapshot(grid(2)));
        let update = GridUpdate::Change(ChangeEvent {
            event_type: ChangeKind::Update,
            table: "users".to_string(),
            new: adopted(1, "Ava", 1),
        });
        assert!(!store.apply(update));
    }

    #[test]
    fn full_adoption_requires_pixels() {
        let mut store = GridStore::new();
        assert!(!store.is_fully_adopted());

        store.apply(GridUpdate::Snapshot(vec![adopted(0, "Ava", 1), adopted(1, "Bo", 1)]));
        assert!(store.is_fully_adopted());
    }
}
