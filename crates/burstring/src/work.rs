/// A unit of work moved through the ring.
///
/// `id` comes from the producer's private counter and is unique and strictly
/// increasing per producer. `payload` is opaque to the queue; it belongs to
/// the producer until the enqueue succeeds and to the consumer once the
/// dequeue returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<P = ()> {
    pub id: u64,
    pub payload: P,
}

impl<P> WorkItem<P> {
    #[inline]
    pub fn new(id: u64, payload: P) -> Self {
        Self { id, payload }
    }

    /// Splits the item into its id and payload.
    #[inline]
    pub fn into_parts(self) -> (u64, P) {
        (self.id, self.payload)
    }
}
