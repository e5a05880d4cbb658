/// Book-keeping of a transparently chunked request.
///
/// When the user asks one source for more results than its auto-split
/// threshold, the relay rewrites the provider-visible count to one chunk at
/// a time and this driver tracks how much of the total budget is left. The
/// user only ever sees the aggregate remaining count.
#[derive(Debug)]
pub(crate) struct AutoSplitCtl {
    threshold: u64,
    /// Results still owed to the user, including the frame being processed.
    count: u64,
    chunk_requested: u64,
    chunk_consumed: u64,
    chunk_first: bool,
}

impl AutoSplitCtl {
    /// Creates a driver for a total of `count` results chunked at
    /// `threshold`. The first provider-visible count is the threshold.
    pub(crate) const fn new(threshold: u64, count: u64) -> Self {
        Self { threshold, count, chunk_requested: threshold, chunk_consumed: 0, chunk_first: true }
    }

    /// The count the provider should see for the current chunk.
    pub(crate) const fn chunk_count(&self) -> u64 {
        self.chunk_requested
    }

    /// Accounts one provider frame and returns the user-visible remaining.
    ///
    /// On the first frame of a chunk an under-delivering provider (reported
    /// remaining below `chunk_requested - 1`) shrinks the total budget to
    /// `provider_remaining + consumed + 1`, keeping the user-visible count
    /// monotonically decreasing. A provider terminal on a chunk that was not
    /// fully consumed means the data ran out: the stream ends now.
    pub(crate) fn account(&mut self, provider_remaining: u64) -> u64 {
        if self.chunk_first {
            if provider_remaining < self.chunk_requested.saturating_sub(1) {
                self.count = provider_remaining + 1;
            }
            self.chunk_first = false;
        }

        self.count = self.count.saturating_sub(1);
        self.chunk_consumed += 1;

        if provider_remaining == 0 && self.chunk_consumed < self.chunk_requested {
            0
        } else {
            self.count
        }
    }

    /// True if, after [`account`](Self::account) returned `remaining`, a
    /// further chunk must be requested from the provider.
    pub(crate) const fn wants_next_chunk(provider_remaining: u64, remaining: u64) -> bool {
        provider_remaining == 0 && remaining > 0
    }

    /// Rolls the driver over to the next chunk.
    ///
    /// Returns the skip increment (what the previous chunk covered) and the
    /// provider-visible count of the new chunk.
    pub(crate) fn begin_next_chunk(&mut self, remaining: u64) -> (u64, u64) {
        let skip_delta = self.chunk_requested;
        self.chunk_first = true;
        self.chunk_consumed = 0;
        if remaining < self.threshold {
            self.chunk_requested = remaining;
        }
        (skip_delta, self.chunk_requested)
    }
}
