/// Which license counting scheme applies to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseBackend {
    Sockets,
    Nodes,
}

/// The licensing subsystem as seen by the node engine.
pub trait LicenseManager: std::fmt::Debug + Send {
    fn is_up(&self, backend: LicenseBackend) -> bool;

    /// Takes `count` licenses. Returns false, consuming nothing, when not enough are free.
    fn consume(&mut self, count: i64) -> bool;

    fn release(&mut self, count: i64);

    fn available(&self) -> i64;
}

/// A fixed pool of socket licenses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensePool {
    total: i64,
    used: i64,
    sockets_up: bool,
    nodes_up: bool,
}

impl LicensePool {
    pub fn new(sockets_available: i64, nodes_up: bool) -> Self {
        LicensePool { total: sockets_available.max(0), used: 0, sockets_up: sockets_available > 0, nodes_up }
    }

    pub fn used(&self) -> i64 {
        self.used
    }
}

impl LicenseManager for LicensePool {
    fn is_up(&self, backend: LicenseBackend) -> bool {
        match backend {
            LicenseBackend::Sockets => self.sockets_up,
            LicenseBackend::Nodes => self.nodes_up,
        }
    }

    fn consume(&mut self, count: i64) -> bool {
        if count < 0 || self.used + count > self.total {
            return false;
        }
        self.used += count;
        true
    }

    fn release(&mut self, count: i64) {
        self.used = (self.used - count).max(0);
    }

    fn available(&self) -> i64 {
        self.total - self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_all_or_nothing() {
        let mut pool = LicensePool::new(4, false);
        assert!(pool.consume(3));
        assert!(!pool.consume(2), "Only one license left");
        assert_eq!(pool.available(), 1);
        pool.release(3);
        assert_eq!(pool.available(), 4);
    }
}
