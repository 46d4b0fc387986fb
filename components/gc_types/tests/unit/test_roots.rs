//! Unit tests for HandleTable and RootSetProvider

use gc_types::{GcRef, HandleTable, RootSetProvider};

fn r(addr: usize) -> Option<GcRef> {
    GcRef::from_addr(addr)
}

#[cfg(test)]
mod handle_table_tests {
    use super::*;

    #[test]
    fn test_released_index_is_reused() {
        let mut table = HandleTable::new();
        let a = table.new_handle(r(8));
        let _b = table.new_handle(r(16));
        assert!(table.release(a));
        let c = table.new_handle(r(24));
        assert_eq!(c.index(), a.index());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_double_release_fails() {
        let mut table = HandleTable::new();
        let a = table.new_handle(None);
        assert!(table.release(a));
        assert!(!table.release(a));
        assert!(!table.set(a, r(8)));
    }

    #[test]
    fn test_enumerate_skips_released() {
        let mut table = HandleTable::new();
        let a = table.new_handle(r(8));
        let _b = table.new_handle(r(16));
        table.release(a);

        let mut seen = Vec::new();
        table.enumerate_roots(&mut |slot| seen.push(*slot));
        assert_eq!(seen, vec![r(16)]);
    }

    #[test]
    fn test_enumerate_allows_rewrite() {
        let mut table = HandleTable::new();
        let a = table.new_handle(r(8));
        table.enumerate_roots(&mut |slot| {
            if *slot == r(8) {
                *slot = r(800);
            }
        });
        assert_eq!(table.get(a), Some(r(800)));
    }

    #[test]
    fn test_vec_provider() {
        let mut roots = vec![r(8), None];
        let mut count = 0;
        roots.enumerate_roots(&mut |_| count += 1);
        assert_eq!(count, 2);
    }
}
