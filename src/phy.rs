//! PHY boundary

use core::fmt::Debug;

use crate::channel::Subslot;
use crate::wire::PhyControlField;
use crate::ChannelId;

/// Physical layer collaborator consumed by the MAC.
///
/// Transmission is fire-and-forget, an error only reports that the frame
/// could not be handed over. Received frames are delivered by the host to
/// `Mac::on_frame_received` as the encoded control field followed by the
/// MAC PDU.
pub trait Phy {
    type Error: Debug;

    /// Queue `data` (an encoded MAC PDU) for transmission in `subslot`
    fn transmit(&mut self, channel: ChannelId, subslot: &Subslot, data: &[u8], control: &PhyControlField) -> Result<(), Self::Error>;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;
    use crate::error::DecodeError;
    use crate::wire::{MacPdu, Wire};

    /// Transmission captured by [`MockPhy`]
    #[derive(Debug, Clone, PartialEq)]
    pub struct Transmission {
        pub channel: ChannelId,
        pub subslot: Subslot,
        pub data: Vec<u8>,
        pub control: PhyControlField,
    }

    impl Transmission {
        /// Decode the carried MAC PDU
        pub fn pdu(&self) -> Result<MacPdu, DecodeError> {
            MacPdu::decode_exact(&self.data)
        }

        /// Frame as seen by a receiver, control field then MAC PDU
        pub fn frame(&self) -> Vec<u8> {
            let mut b = std::vec![0u8; self.control.encoded_len()];
            self.control.encode(&mut b).unwrap();
            b.extend_from_slice(&self.data);
            b
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct MockPhyError;

    /// Recording PHY, clones share the transmission log
    #[derive(Clone, Debug, Default)]
    pub struct MockPhy {
        sent: Arc<Mutex<Vec<Transmission>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl MockPhy {
        pub fn new() -> Self {
            Self::default()
        }

        /// Remove and return everything transmitted so far
        pub fn take(&mut self) -> Vec<Transmission> {
            core::mem::take(&mut *self.sent.lock().unwrap())
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        /// Make subsequent transmissions fail
        pub fn set_fail(&mut self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    impl Phy for MockPhy {
        type Error = MockPhyError;

        fn transmit(&mut self, channel: ChannelId, subslot: &Subslot, data: &[u8], control: &PhyControlField) -> Result<(), Self::Error> {
            if *self.fail.lock().unwrap() {
                return Err(MockPhyError);
            }

            self.sent.lock().unwrap().push(Transmission {
                channel,
                subslot: *subslot,
                data: data.to_vec(),
                control: *control,
            });
            Ok(())
        }
    }
}
