//! Interrupt service routine for the transfer engine.

use log::trace;

use crate::{completion::CompletionFlags, pdma::TransferStatus};

/// Transfer-done interrupt body: classify which channels completed, latch their flags, return.
///
/// Every completed channel is latched, not only the lowest one, so two channels finishing
/// between two interrupt entries are both observed. Must be called from the platform's
/// interrupt dispatch and never blocks.
pub fn on_transfer_complete<S: TransferStatus>(status: &mut S, flags: &CompletionFlags) {
    let completed = status.take_completed();
    for channel in completed.iter() {
        trace!("transfer done on channel {}", channel.index());
        flags.signal(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdma::{Channel, ChannelSet};

    struct Latched(u32);

    impl TransferStatus for Latched {
        fn take_completed(&mut self) -> ChannelSet {
            let done = ChannelSet::from_bits(self.0);
            self.0 = 0;
            done
        }
    }

    #[test]
    fn every_completed_channel_is_signalled() {
        let flags = CompletionFlags::new();
        let mut status = Latched(0b10100);
        on_transfer_complete(&mut status, &flags);
        assert!(flags.is_done(Channel::new(2).unwrap()));
        assert!(flags.is_done(Channel::new(4).unwrap()));
        assert!(!flags.is_done(Channel::new(3).unwrap()));
        assert_eq!(status.0, 0);
    }

    #[test]
    fn spurious_entry_signals_nothing() {
        let flags = CompletionFlags::new();
        on_transfer_complete(&mut Latched(0), &flags);
        assert!((0..12).all(|i| !flags.is_done(Channel::new(i).unwrap())));
    }
}
