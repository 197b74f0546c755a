// smoltcp network stack integration
// Feeds frames from the receive worker into a smoltcp interface and sends
// smoltcp's output through the transmit path.

use crate::adapter::{Rejected, StackInput};
use crate::config::{InterfaceFlags, NetifId, ETH_HEADER_LEN};
use crate::dma::PacketBuf;
use crate::drivers::DmaEngine;
use crate::error::NetError;
use crate::tx::TransmitPath;
use alloc::sync::Arc;
use alloc::vec::Vec;
use heapless::Deque;
use log::{trace, warn};
use shared::timer::Clock;
use smoltcp::iface::{Config, Interface, SocketSet};
use smoltcp::phy::{Checksum, Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;
use smoltcp::wire::{EthernetAddress, HardwareAddress, IpAddress, IpCidr, Ipv4Address};
use spin::Mutex;

/// Frames waiting for the next smoltcp poll
pub const STACK_QUEUE_DEPTH: usize = 8;

/// Bounded hand-off queue between the receive worker and smoltcp
///
/// The worker side delivers into it; the device side pops from it. A full
/// queue rejects the frame, which sends the buffer back to the pool.
#[derive(Clone, Default)]
pub struct StackQueue {
    frames: Arc<Mutex<Deque<PacketBuf, STACK_QUEUE_DEPTH>>>,
}

impl StackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<PacketBuf> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

impl StackInput for StackQueue {
    fn deliver(&mut self, frame: PacketBuf, netif: NetifId) -> Result<(), Rejected> {
        match self.frames.lock().push_back(frame) {
            Ok(()) => Ok(()),
            Err(frame) => {
                trace!("netif{}: stack queue full", netif.0);
                Err(Rejected(frame))
            }
        }
    }
}

/// smoltcp device over the driver
pub struct EthernetDevice<E: DmaEngine, C: Clock> {
    queue: StackQueue,
    transmitter: Arc<TransmitPath<E, C>>,
    mtu: u16,
    flags: InterfaceFlags,
}

impl<E: DmaEngine, C: Clock> EthernetDevice<E, C> {
    pub fn new(
        queue: StackQueue,
        transmitter: Arc<TransmitPath<E, C>>,
        mtu: u16,
        flags: InterfaceFlags,
    ) -> Self {
        Self {
            queue,
            transmitter,
            mtu,
            flags,
        }
    }
}

pub struct EthernetRxToken {
    frame: PacketBuf,
}

impl RxToken for EthernetRxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(&mut self.frame[..])
    }
}

pub struct EthernetTxToken<'a, E: DmaEngine, C: Clock> {
    transmitter: &'a TransmitPath<E, C>,
}

impl<'a, E: DmaEngine, C: Clock> TxToken for EthernetTxToken<'a, E, C> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0u8; len];
        let result = f(&mut buffer);

        // smoltcp has no way to see a send failure; the path counts it
        if let Err(err) = self.transmitter.transmit_frame(&buffer) {
            warn!("stack: {} byte frame not sent: {}", len, err);
        }

        result
    }
}

impl<E: DmaEngine, C: Clock> Device for EthernetDevice<E, C> {
    type RxToken<'a> = EthernetRxToken where Self: 'a;
    type TxToken<'a> = EthernetTxToken<'a, E, C> where Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let frame = self.queue.pop()?;
        Some((
            EthernetRxToken { frame },
            EthernetTxToken {
                transmitter: &self.transmitter,
            },
        ))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(EthernetTxToken {
            transmitter: &self.transmitter,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = self.mtu as usize + ETH_HEADER_LEN;
        caps.max_burst_size = Some(1);
        caps.medium = Medium::Ethernet;
        if self.flags.contains(InterfaceFlags::CHECKSUM_OFFLOAD) {
            caps.checksum.ipv4 = Checksum::Rx;
            caps.checksum.udp = Checksum::Rx;
            caps.checksum.tcp = Checksum::Rx;
            caps.checksum.icmpv4 = Checksum::Rx;
        }
        caps
    }
}

/// Network stack using smoltcp
pub struct NetworkStack<E: DmaEngine, C: Clock> {
    iface: Interface,
    sockets: SocketSet<'static>,
    device: EthernetDevice<E, C>,
    mac: [u8; 6],
}

impl<E: DmaEngine, C: Clock> NetworkStack<E, C> {
    /// Create the interface; without `ip_config` it starts at 0.0.0.0/0
    pub fn new(
        mut device: EthernetDevice<E, C>,
        mac: [u8; 6],
        ip_config: Option<(Ipv4Address, u8)>,
    ) -> Result<Self, NetError> {
        let config = Config::new(HardwareAddress::Ethernet(EthernetAddress::from_bytes(&mac)));
        let iface = Interface::new(config, &mut device, Instant::ZERO);

        let mut stack = Self {
            iface,
            sockets: SocketSet::new(Vec::new()),
            device,
            mac,
        };
        let (ip, prefix_len) = ip_config.unwrap_or((Ipv4Address::UNSPECIFIED, 0));
        stack.add_ipv4_addr(ip, prefix_len)?;
        Ok(stack)
    }

    /// Add an address; fails once the interface address list is full
    pub fn add_ipv4_addr(&mut self, ip: Ipv4Address, prefix_len: u8) -> Result<(), NetError> {
        let mut pushed = Ok(());
        self.iface.update_ip_addrs(|ip_addrs| {
            pushed = ip_addrs
                .push(IpCidr::new(IpAddress::Ipv4(ip), prefix_len))
                .map_err(|_| NetError::Smoltcp("interface address list full"));
        });
        pushed
    }

    /// Process queued frames, timers and pending output
    ///
    /// Returns whether any socket state may have changed.
    pub fn poll(&mut self, timestamp_ms: i64) -> bool {
        let timestamp = Instant::from_millis(timestamp_ms);
        self.iface.poll(timestamp, &mut self.device, &mut self.sockets)
    }

    pub fn interface(&self) -> &Interface {
        &self.iface
    }

    pub fn interface_mut(&mut self) -> &mut Interface {
        &mut self.iface
    }

    pub fn sockets(&self) -> &SocketSet<'static> {
        &self.sockets
    }

    pub fn sockets_mut(&mut self) -> &mut SocketSet<'static> {
        &mut self.sockets
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::dma::PacketPool;
    use crate::drivers::sim::{SimulatedMac, StepClock};
    use crate::netif::EthernetIf;

    const STATION: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const PEER: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

    fn arp_request(target_ip: [u8; 4]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&PEER);
        frame.extend_from_slice(&[0x08, 0x06]);
        frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        frame.extend_from_slice(&PEER);
        frame.extend_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&[0; 6]);
        frame.extend_from_slice(&target_ip);
        frame
    }

    fn bring_up(flags: InterfaceFlags) -> (EthernetIf<SimulatedMac, StepClock>, Arc<SimulatedMac>) {
        let mac = Arc::new(SimulatedMac::new());
        let mut netif = EthernetIf::new(DriverConfig::default(), mac.clone(), StepClock::new()).unwrap();
        netif.configure(STATION, 1500, flags).unwrap();
        netif.start();
        (netif, mac)
    }

    #[test]
    fn test_queue_rejects_when_full() {
        let pool = PacketPool::new(STACK_QUEUE_DEPTH + 1, 64);
        let mut queue = StackQueue::new();
        for _ in 0..STACK_QUEUE_DEPTH {
            assert!(queue.deliver(pool.alloc(60).unwrap(), NetifId(0)).is_ok());
        }
        let rejected = queue.deliver(pool.alloc(60).unwrap(), NetifId(0));
        assert!(rejected.is_err());
        drop(rejected);
        assert_eq!(pool.available(), 1);
        assert_eq!(queue.len(), STACK_QUEUE_DEPTH);

        while queue.pop().is_some() {}
        assert_eq!(pool.available(), STACK_QUEUE_DEPTH + 1);
    }

    #[test]
    fn test_capabilities_follow_interface() {
        let (netif, _) = bring_up(InterfaceFlags::CHECKSUM_OFFLOAD);
        let device = EthernetDevice::new(StackQueue::new(), netif.transmitter(), 1500, InterfaceFlags::CHECKSUM_OFFLOAD);
        let caps = device.capabilities();
        assert_eq!(caps.max_transmission_unit, 1514);
        assert_eq!(caps.max_burst_size, Some(1));
        assert_eq!(caps.medium, Medium::Ethernet);
        assert!(!caps.checksum.tcp.tx());
        assert!(caps.checksum.tcp.rx());

        let plain = EthernetDevice::new(StackQueue::new(), netif.transmitter(), 576, InterfaceFlags::empty());
        assert_eq!(plain.capabilities().max_transmission_unit, 590);
        assert!(plain.capabilities().checksum.tcp.tx());
    }

    #[test]
    fn test_arp_request_answered_through_driver() {
        let (mut netif, mac) = bring_up(InterfaceFlags::BROADCAST | InterfaceFlags::ETHARP);
        let queue = StackQueue::new();
        let mut worker = netif.receive_worker(queue.clone()).unwrap();
        let device = EthernetDevice::new(queue.clone(), netif.transmitter(), 1500, netif.interface().flags);
        let mut stack = NetworkStack::new(device, STATION, Some((Ipv4Address::new(10, 0, 0, 1), 24))).unwrap();
        assert_eq!(stack.mac_address(), STATION);

        mac.inject_frame(&arp_request([10, 0, 0, 1])).unwrap();
        netif.interrupt_bridge().handle_interrupt(&*mac);
        assert_eq!(worker.poll(), 1);
        assert_eq!(queue.len(), 1);

        stack.poll(10);
        assert!(queue.is_empty());

        let sent = mac.sent_frames();
        let reply = sent
            .iter()
            .find(|frame| frame[12..14] == [0x08, 0x06])
            .expect("no ARP reply sent");
        assert_eq!(&reply[0..6], &PEER);
        assert_eq!(&reply[6..12], &STATION);
        // opcode 2: reply
        assert_eq!(&reply[20..22], &[0x00, 0x02]);
        assert_eq!(worker.pool().available(), worker.pool().capacity());
    }

    #[test]
    fn test_unspecified_address_without_config() {
        let (netif, _) = bring_up(InterfaceFlags::empty());
        let device = EthernetDevice::new(StackQueue::new(), netif.transmitter(), 1500, InterfaceFlags::empty());
        let stack = NetworkStack::new(device, STATION, None).unwrap();
        assert_eq!(stack.interface().ip_addrs().len(), 1);
        assert!(stack.interface().ipv4_addr().map_or(true, |ip| ip.is_unspecified()));
    }

    #[test]
    fn test_full_address_list_is_reported() {
        let (netif, _) = bring_up(InterfaceFlags::empty());
        let device = EthernetDevice::new(StackQueue::new(), netif.transmitter(), 1500, InterfaceFlags::empty());
        let mut stack = NetworkStack::new(device, STATION, Some((Ipv4Address::new(10, 0, 0, 1), 24))).unwrap();

        let failure = (1..=16u8)
            .map(|net| stack.add_ipv4_addr(Ipv4Address::new(10, net, 0, 1), 24))
            .find(|result| result.is_err());
        assert_eq!(failure, Some(Err(NetError::Smoltcp("interface address list full"))));

        let count = stack.interface().ip_addrs().len();
        assert_eq!(
            stack.add_ipv4_addr(Ipv4Address::new(192, 168, 1, 1), 24),
            Err(NetError::Smoltcp("interface address list full"))
        );
        assert_eq!(stack.interface().ip_addrs().len(), count);
    }
}
