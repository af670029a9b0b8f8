//! Client configuration.

use std::time::Duration;

/// Connection balancing policy for multi-server clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancerKind {
    /// Always use the first connection.
    #[default]
    Simple,
    /// Rotate through connections with an atomic counter.
    RoundRobin,
    /// Stick to one connection while it has free capacity, then advance.
    HotSpot,
}

/// Options for [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub(crate) addresses: Vec<String>,
    pub(crate) balancer: BalancerKind,
    pub(crate) max_streams: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) max_frame_size: usize,
    pub(crate) cache_max_bytes: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            balancer: BalancerKind::Simple,
            max_streams: 100,
            connect_timeout: Duration::from_secs(5),
            max_frame_size: verdict_core::frame::MAX_FRAME_SIZE,
            cache_max_bytes: None,
        }
    }
}

impl ClientOptions {
    /// Creates the default options: one upstream, 100 request slots,
    /// five second connect timeout, no cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upstream addresses; the connect-time address argument is
    /// ignored when this list is non-empty.
    #[must_use]
    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the balancer used when more than one address is configured.
    #[must_use]
    pub const fn with_balancer(mut self, balancer: BalancerKind) -> Self {
        self.balancer = balancer;
        self
    }

    /// Sets the number of in-flight request slots per connection.
    ///
    /// # Panics
    ///
    /// Panics when `n` is zero or above the 65536 slot-index limit.
    #[must_use]
    pub fn with_streams(mut self, n: usize) -> Self {
        assert!(
            n >= 1 && n <= usize::from(u16::MAX) + 1,
            "streaming client needs between 1 and 65536 request slots but got {n}"
        );
        self.max_streams = n;
        self
    }

    /// Sets the connection establishment timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables the response cache with a total byte budget.
    #[must_use]
    pub const fn with_cache(mut self, max_bytes: usize) -> Self {
        self.cache_max_bytes = Some(max_bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates() {
        let opts = ClientOptions::new()
            .with_addresses(["a:1", "b:2"])
            .with_balancer(BalancerKind::RoundRobin)
            .with_streams(4)
            .with_connect_timeout(Duration::from_millis(250))
            .with_cache(1024);

        assert_eq!(opts.addresses, ["a:1", "b:2"]);
        assert_eq!(opts.balancer, BalancerKind::RoundRobin);
        assert_eq!(opts.max_streams, 4);
        assert_eq!(opts.connect_timeout, Duration::from_millis(250));
        assert_eq!(opts.cache_max_bytes, Some(1024));
    }

    #[test]
    #[should_panic(expected = "request slots")]
    fn zero_streams_is_rejected() {
        let _ = ClientOptions::new().with_streams(0);
    }
}
