// Upper-layer dispatch
//
// Classifies reassembled frames by ethertype and hands accepted ones to the
// network stack. Every frame not taken by the stack is dropped here, which
// returns its buffer to the scratch pool.

use crate::config::NetifId;
use crate::dma::PacketBuf;
use crate::stats::LinkStats;
use alloc::sync::Arc;
use log::{debug, trace};
use smoltcp::wire::{EthernetFrame, EthernetProtocol};

const ETHERTYPE_PPPOE_DISCOVERY: u16 = 0x8863;
const ETHERTYPE_PPPOE_SESSION: u16 = 0x8864;

/// Stack refused a frame; the buffer comes back with the refusal
#[derive(Debug)]
pub struct Rejected(pub PacketBuf);

/// Input side of the network stack
///
/// Called once per accepted frame from the receive worker. Delivery is at
/// most once: a rejected frame is not retried.
pub trait StackInput: Send {
    fn deliver(&mut self, frame: PacketBuf, netif: NetifId) -> Result<(), Rejected>;
}

/// Outcome of dispatching one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    /// Too short to carry an Ethernet header
    Runt,
    UnknownType(u16),
    Rejected,
}

/// Stateless ethertype classifier in front of a [`StackInput`]
pub struct UpperLayer<S: StackInput> {
    stack: S,
    netif: NetifId,
    accept_pppoe: bool,
    stats: Arc<LinkStats>,
}

impl<S: StackInput> UpperLayer<S> {
    pub fn new(stack: S, netif: NetifId, accept_pppoe: bool, stats: Arc<LinkStats>) -> Self {
        Self {
            stack,
            netif,
            accept_pppoe,
            stats,
        }
    }

    /// Whether frames of `ethertype` go to the stack
    pub fn accepts(&self, ethertype: EthernetProtocol) -> bool {
        match ethertype {
            EthernetProtocol::Ipv4 | EthernetProtocol::Ipv6 | EthernetProtocol::Arp => true,
            EthernetProtocol::Unknown(ETHERTYPE_PPPOE_DISCOVERY)
            | EthernetProtocol::Unknown(ETHERTYPE_PPPOE_SESSION) => self.accept_pppoe,
            _ => false,
        }
    }

    pub fn dispatch(&mut self, frame: PacketBuf) -> Dispatch {
        let ethertype = match EthernetFrame::new_checked(&frame[..]) {
            Ok(eth) => eth.ethertype(),
            Err(_) => {
                debug!("netif{}: dropping {} byte runt", self.netif.0, frame.len());
                LinkStats::inc(&self.stats.rx_unknown_type);
                return Dispatch::Runt;
            }
        };

        if !self.accepts(ethertype) {
            trace!("netif{}: dropping ethertype {}", self.netif.0, ethertype);
            LinkStats::inc(&self.stats.rx_unknown_type);
            return Dispatch::UnknownType(u16::from(ethertype));
        }

        match self.stack.deliver(frame, self.netif) {
            Ok(()) => Dispatch::Delivered,
            Err(Rejected(frame)) => {
                debug!("netif{}: stack rejected {} byte frame", self.netif.0, frame.len());
                LinkStats::inc(&self.stats.rx_rejected);
                Dispatch::Rejected
            }
        }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }
}
