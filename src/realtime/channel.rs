//! Per-vault channel table (§4.7, §5, §9).
//!
//! A [`Channel`] is the server-side handle for one open `(vault, device_id)`
//! fan-out session. [`ChannelTable`] owns every open channel for one vault
//! and enforces device-keyed replacement: opening a channel for a
//! `device_id` that already has one displaces the old one, observably to
//! the next broadcast, by holding the table mutex for the whole
//! close-then-insert (§9 "device-keyed channel replacement").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use super::types::ChannelMessage;

/// One open fan-out channel. Cheap to clone (wraps an `Arc` internally via
/// [`ChannelTable`]); holders send through it with [`Channel::send`].
pub struct Channel {
    /// The device this channel belongs to.
    pub device_id: String,
    last_seen: Mutex<i64>,
    outbound: mpsc::UnboundedSender<ChannelMessage>,
    close: Mutex<Option<oneshot::Sender<()>>>,
}

impl Channel {
    /// Enqueue `msg` for delivery to this channel's socket task. Returns
    /// `false` if the socket task has already exited.
    pub fn send(&self, msg: ChannelMessage) -> bool {
        self.outbound.send(msg).is_ok()
    }

    /// Refresh `last_seen` to `now` (§5 "inbound traffic refreshes
    /// `last_seen`").
    pub fn touch(&self, now: i64) {
        *self.last_seen.lock().expect("channel mutex poisoned") = now;
    }

    /// Seconds since epoch of the last inbound traffic on this channel.
    #[must_use]
    pub fn last_seen(&self) -> i64 {
        *self.last_seen.lock().expect("channel mutex poisoned")
    }

    /// Signal the owning socket task to close. Idempotent.
    pub fn force_close(&self) {
        if let Some(tx) = self.close.lock().expect("channel mutex poisoned").take() {
            let _ = tx.send(());
        }
    }
}

/// A freshly opened channel, returned to the caller that owns the actual
/// socket (the `/vault/:v/ws` handler).
pub struct OpenedChannel {
    /// The table's handle, used to touch `last_seen` and read `device_id`.
    pub channel: Arc<Channel>,
    /// Outbound messages queued for this channel by broadcasts, pings, or
    /// direct replies; the socket task forwards these to the wire.
    pub outbound_rx: mpsc::UnboundedReceiver<ChannelMessage>,
    /// Fires when [`Channel::force_close`] is called (displaced by a newer
    /// connection for the same device, or evicted for staleness); the
    /// socket task should close the socket on receipt.
    pub close_rx: oneshot::Receiver<()>,
}

/// Every open channel for one vault, keyed by `device_id`.
#[derive(Default)]
pub struct ChannelTable {
    inner: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelTable {
    /// Open a new channel for `device_id`, displacing any existing channel
    /// for the same device. The displaced channel's socket task is signaled
    /// to close while this table's mutex is held, so no broadcast can race
    /// between the close and the insert (§9).
    pub fn open(&self, device_id: &str, now: i64) -> OpenedChannel {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let channel = Arc::new(Channel {
            device_id: device_id.to_owned(),
            last_seen: Mutex::new(now),
            outbound: outbound_tx,
            close: Mutex::new(Some(close_tx)),
        });

        let mut inner = self.inner.lock().expect("channel table mutex poisoned");
        if let Some(old) = inner.insert(device_id.to_owned(), Arc::clone(&channel)) {
            old.force_close();
        }
        OpenedChannel { channel, outbound_rx, close_rx }
    }

    /// Remove `device_id`'s channel entry, if the given channel is still the
    /// current one for that device (a displaced channel removing itself on
    /// exit must not evict its replacement).
    pub fn close(&self, device_id: &str, channel: &Arc<Channel>) {
        let mut inner = self.inner.lock().expect("channel table mutex poisoned");
        if let Some(current) = inner.get(device_id)
            && Arc::ptr_eq(current, channel)
        {
            inner.remove(device_id);
        }
    }

    /// Send `msg` to every channel of this vault except `origin_device_id`
    /// (§4.7 "Broadcast policy"). Channels whose send fails are logged and
    /// closed.
    pub fn broadcast(&self, origin_device_id: &str, msg: &ChannelMessage) {
        let mut failed = Vec::new();
        {
            let inner = self.inner.lock().expect("channel table mutex poisoned");
            for (device_id, channel) in inner.iter() {
                if device_id == origin_device_id {
                    continue;
                }
                if !channel.send(msg.clone()) {
                    failed.push(device_id.clone());
                }
            }
        }
        if failed.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("channel table mutex poisoned");
        for device_id in failed {
            tracing::warn!(device_id, "fan-out delivery failed, closing channel");
            if let Some(channel) = inner.remove(&device_id) {
                channel.force_close();
            }
        }
    }

    /// Send `msg` directly to `device_id`'s channel, if open.
    pub fn send_to(&self, device_id: &str, msg: ChannelMessage) -> bool {
        let inner = self.inner.lock().expect("channel table mutex poisoned");
        inner.get(device_id).is_some_and(|c| c.send(msg))
    }

    /// Refresh `device_id`'s `last_seen`, if it has an open channel.
    pub fn touch(&self, device_id: &str, now: i64) {
        let inner = self.inner.lock().expect("channel table mutex poisoned");
        if let Some(channel) = inner.get(device_id) {
            channel.touch(now);
        }
    }

    /// Close every channel whose `last_seen` is older than `stale_after`
    /// seconds, and ping every channel that survives (§4.7 "Heartbeat").
    pub fn heartbeat(&self, now: i64, stale_after: i64, ping: impl Fn(&str) -> ChannelMessage) {
        let mut stale = Vec::new();
        let mut alive = Vec::new();
        {
            let inner = self.inner.lock().expect("channel table mutex poisoned");
            for (device_id, channel) in inner.iter() {
                if now - channel.last_seen() > stale_after {
                    stale.push(device_id.clone());
                } else {
                    alive.push(Arc::clone(channel));
                }
            }
        }
        if !stale.is_empty() {
            let mut inner = self.inner.lock().expect("channel table mutex poisoned");
            for device_id in &stale {
                tracing::info!(device_id, "evicting stale channel");
                if let Some(channel) = inner.remove(device_id) {
                    channel.force_close();
                }
            }
        }
        for channel in alive {
            channel.send(ping(&channel.device_id));
        }
    }

    /// Number of channels currently open for this vault (§6 `/ws/status`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("channel table mutex poisoned").len()
    }

    /// `true` if no channel is open for this vault.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::MessageType;

    #[test]
    fn opening_a_second_channel_for_same_device_closes_the_first() {
        let table = ChannelTable::default();
        let first = table.open("device-1", 0);
        let second = table.open("device-1", 1);

        assert!(first.close_rx.try_recv().is_ok());
        assert!(second.close_rx.try_recv().is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn broadcast_skips_origin_device() {
        let table = ChannelTable::default();
        let mut a = table.open("a", 0);
        let mut b = table.open("b", 0);
        let msg = ChannelMessage::new(MessageType::Ping, "v", "a", 0);
        table.broadcast("a", &msg);

        assert!(a.outbound_rx.try_recv().is_err());
        assert!(b.outbound_rx.try_recv().is_ok());
    }

    #[test]
    fn heartbeat_evicts_only_stale_channels() {
        let table = ChannelTable::default();
        let fresh = table.open("fresh", 100);
        let stale = table.open("stale", 0);

        table.heartbeat(100, 60, |device_id| ChannelMessage::new(MessageType::Ping, "v", device_id, 100));

        assert!(stale.close_rx.try_recv().is_ok());
        assert!(fresh.close_rx.try_recv().is_err());
        assert_eq!(table.len(), 1);
    }
}
