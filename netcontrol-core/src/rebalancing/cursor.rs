use crate::graph::WorkerId;

/// Round-robin cursor over the idle worker pool.
///
/// A lookup scans from the cursor to the end of the pool, then wraps once to
/// the head; it gives up after one full turn.
#[derive(Debug, Default)]
pub(super) struct IdleCursor {
    next: usize,
}

impl IdleCursor {
    pub(super) fn next_matching(
        &mut self,
        pool: &[WorkerId],
        matches: impl Fn(WorkerId) -> bool,
    ) -> Option<WorkerId> {
        let len = pool.len();
        for step in 0..len {
            let idx = (self.next + step) % len;
            if matches(pool[idx]) {
                self.next = idx + 1;
                return Some(pool[idx]);
            }
        }
        None
    }

    /// Drops `id` from the pool keeping the cursor on the same successor.
    pub(super) fn remove(&mut self, pool: &mut Vec<WorkerId>, id: WorkerId) {
        if let Some(idx) = pool.iter().position(|w| *w == id) {
            pool.remove(idx);
            if idx < self.next {
                self.next -= 1;
            }
        }
    }
}

/// Worker cursor that walks the id-ordered list forward, then backward, then
/// forward again. Handing out the last worker of the current direction flips
/// the direction and restarts at the head of the reversed list.
#[derive(Debug)]
pub(super) struct SerpentineCursor {
    order: Vec<WorkerId>,
    forward: bool,
    pos: usize,
}

impl SerpentineCursor {
    pub(super) fn new(mut order: Vec<WorkerId>) -> Self {
        order.sort_unstable();
        Self {
            order,
            forward: true,
            pos: 0,
        }
    }

    fn at(&self, pos: usize) -> WorkerId {
        if self.forward {
            self.order[pos]
        } else {
            self.order[self.order.len() - 1 - pos]
        }
    }

    /// Next worker accepted by `matches`. When the current direction runs out
    /// without a match the cursor restarts at the head of the same direction
    /// and nothing is returned.
    pub(super) fn next_matching(&mut self, matches: impl Fn(WorkerId) -> bool) -> Option<WorkerId> {
        let len = self.order.len();
        while self.pos < len {
            let id = self.at(self.pos);
            self.pos += 1;
            if matches(id) {
                if self.pos == len {
                    self.forward = !self.forward;
                    self.pos = 0;
                }
                return Some(id);
            }
        }
        self.pos = 0;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_cursor_wraps_once() {
        let pool = vec![4, 5, 6];
        let mut cursor = IdleCursor::default();

        assert_eq!(cursor.next_matching(&pool, |id| id == 6), Some(6));
        // past the end: wraps to the head
        assert_eq!(cursor.next_matching(&pool, |id| id == 4), Some(4));
        assert_eq!(cursor.next_matching(&pool, |id| id == 9), None);
    }

    #[test]
    fn idle_cursor_keeps_position_on_removal() {
        let mut pool = vec![1, 2, 3];
        let mut cursor = IdleCursor::default();
        assert_eq!(cursor.next_matching(&pool, |_| true), Some(1));
        assert_eq!(cursor.next_matching(&pool, |_| true), Some(2));

        cursor.remove(&mut pool, 1);
        assert_eq!(cursor.next_matching(&pool, |_| true), Some(3));
    }

    #[test]
    fn serpentine_cursor_alternates_direction() {
        let mut cursor = SerpentineCursor::new(vec![2, 0, 1]);
        let order: Vec<_> = (0..7)
            .map(|_| cursor.next_matching(|_| true).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 2, 1, 0, 0]);
    }

    #[test]
    fn serpentine_cursor_resets_without_match() {
        let mut cursor = SerpentineCursor::new(vec![0, 1, 2]);
        assert_eq!(cursor.next_matching(|id| id == 0), Some(0));
        assert_eq!(cursor.next_matching(|id| id == 0), None);
        // restarted at the head of the forward list
        assert_eq!(cursor.next_matching(|id| id == 0), Some(0));
    }
}
