/// Capped, append-only byte log addressed by logical offsets.
///
/// Offsets count every byte ever appended, so an offset recorded before a
/// command stays valid after the oldest bytes are dropped to honor the cap.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    /// Logical offset of `data[0]`.
    base: u64,
    cap: usize,
    /// Everything before this offset was already handed to a caller.
    delivered: u64,
    /// Command responses returned past the cursor; sorted, non-overlapping.
    handed_out: Vec<(u64, u64)>,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            base: 0,
            cap: cap.max(1),
            delivered: 0,
            handed_out: Vec::new(),
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
        if self.data.len() > self.cap {
            // Drop an extra eighth so a full buffer is not shifted on every chunk.
            let excess = self.data.len() - self.cap + self.cap / 8;
            let excess = excess.min(self.data.len());
            self.data.drain(..excess);
            self.base += excess as u64;
            let base = self.base;
            self.handed_out.retain(|&(_, to)| to > base);
        }
    }

    /// Logical offset one past the newest byte.
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Logical offset of the oldest retained byte.
    pub fn start(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes from `offset` to the end; offsets older than the retained range
    /// are clamped to the oldest byte still held.
    pub fn since(&self, offset: u64) -> &[u8] {
        let start = offset.clamp(self.base, self.end()) - self.base;
        self.data.get(start as usize..).unwrap_or(&[])
    }

    /// Bytes in `[from, to)`, clamped to the retained range.
    pub fn range(&self, from: u64, to: u64) -> &[u8] {
        let end = self.end();
        let from = from.clamp(self.base, end) - self.base;
        let to = to.clamp(self.base, end) - self.base;
        if from >= to {
            return &[];
        }
        self.data.get(from as usize..to as usize).unwrap_or(&[])
    }

    /// At most `max` of the newest bytes after `offset`.
    pub fn tail_since(&self, offset: u64, max: usize) -> &[u8] {
        let fresh = self.since(offset);
        let skip = fresh.len().saturating_sub(max);
        fresh.get(skip..).unwrap_or(&[])
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.max(self.base)
    }

    /// Everything not yet handed to a caller; advances the read cursor.
    pub fn take_undelivered(&mut self) -> Vec<u8> {
        let end = self.end();
        let mut bytes = Vec::new();
        let mut cursor = self.delivered.max(self.base);
        for &(from, to) in &self.handed_out {
            if from > cursor {
                bytes.extend_from_slice(self.range(cursor, from));
            }
            cursor = cursor.max(to);
        }
        if cursor < end {
            bytes.extend_from_slice(self.range(cursor, end));
        }
        self.delivered = end;
        self.handed_out.clear();
        bytes
    }

    /// Record that `[from, to)` was returned to a caller. Bytes before
    /// `from` that nobody has seen stay available to `take_undelivered`.
    pub fn mark_delivered(&mut self, from: u64, to: u64) {
        let to = to.min(self.end());
        if from >= to {
            return;
        }
        // Bytes trimmed off the front can no longer be delivered.
        self.delivered = self.delivered();
        if from <= self.delivered {
            self.delivered = self.delivered.max(to);
        } else {
            let idx = self.handed_out.partition_point(|&(start, _)| start < from);
            self.handed_out.insert(idx, (from, to));
            self.merge_handed_out();
        }
        self.absorb_into_cursor();
    }

    fn merge_handed_out(&mut self) {
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.handed_out.len());
        for &(from, to) in &self.handed_out {
            match merged.last_mut() {
                Some(last) if from <= last.1 => last.1 = last.1.max(to),
                _ => merged.push((from, to)),
            }
        }
        self.handed_out = merged;
    }

    fn absorb_into_cursor(&mut self) {
        let mut absorbed = 0;
        for &(from, to) in &self.handed_out {
            if from > self.delivered {
                break;
            }
            self.delivered = self.delivered.max(to);
            absorbed += 1;
        }
        self.handed_out.drain(..absorbed);
    }

    /// Forget all retained output; offsets keep counting.
    pub fn clear(&mut self) {
        self.base = self.end();
        self.data.clear();
        self.delivered = self.base;
        self.handed_out.clear();
    }
}
