//! Ethernet interface driver context.
//!
//! [`EthernetIf`] is built once per controller and owns the rings, the
//! scratch pool and the engine handle. It hands out the three roles that run
//! concurrently afterwards:
//!
//! - the [`InterruptBridge`] for the DMA interrupt vector,
//! - the single [`ReceiveWorker`] task,
//! - the shared [`TransmitPath`] for any number of sending threads.

use crate::adapter::{StackInput, UpperLayer};
use crate::config::{DriverConfig, InterfaceConfig, InterfaceFlags, ETH_HEADER_LEN};
use crate::dma::{DescriptorRing, Direction, PacketPool};
use crate::drivers::interrupts::InterruptBridge;
use crate::drivers::DmaEngine;
use crate::error::NetError;
use crate::rx::ReceiveWorker;
use crate::stats::{LinkStats, LinkStatsSnapshot};
use crate::tx::TransmitPath;
use alloc::sync::Arc;
use log::info;
use shared::timer::Clock;

/// Smallest MTU an IPv4 interface may use
const MIN_MTU: u16 = 68;

/// One DMA Ethernet interface
pub struct EthernetIf<E: DmaEngine, C: Clock + Clone> {
    config: DriverConfig,
    iface: InterfaceConfig,
    engine: Arc<E>,
    clock: C,
    rx_ring: Arc<DescriptorRing>,
    tx_ring: Arc<DescriptorRing>,
    transmitter: Arc<TransmitPath<E, C>>,
    bridge: Arc<InterruptBridge>,
    pool: PacketPool,
    stats: Arc<LinkStats>,
    worker_taken: bool,
    started: bool,
}

impl<E: DmaEngine, C: Clock + Clone> EthernetIf<E, C> {
    /// Allocate rings and buffers and bind them to the engine
    pub fn new(config: DriverConfig, engine: Arc<E>, clock: C) -> Result<Self, NetError> {
        config.validate()?;

        let rx_ring = Arc::new(DescriptorRing::new(
            Direction::Receive,
            config.rx_slots,
            config.rx_buffer_size,
        )?);
        let tx_ring = Arc::new(DescriptorRing::new(
            Direction::Transmit,
            config.tx_slots,
            config.tx_buffer_size,
        )?);
        engine.ring_init(&rx_ring, &tx_ring)?;

        let iface = InterfaceConfig::default();
        let stats = Arc::new(LinkStats::new());
        let bridge = Arc::new(InterruptBridge::new(config.wakeup_capacity(), stats.clone()));
        let transmitter = Arc::new(TransmitPath::new(
            tx_ring.clone(),
            engine.clone(),
            clock.clone(),
            config.tx_lock_timeout,
            iface.max_frame_len(),
            stats.clone(),
        ));
        let pool = PacketPool::new(config.scratch_buffers, config.scratch_buffer_size);

        Ok(Self {
            config,
            iface,
            engine,
            clock,
            rx_ring,
            tx_ring,
            transmitter,
            bridge,
            pool,
            stats,
            worker_taken: false,
            started: false,
        })
    }

    /// Bring-up parameters from the stack; call before [`start`](Self::start)
    pub fn configure(&mut self, mac: [u8; 6], mtu: u16, flags: InterfaceFlags) -> Result<(), NetError> {
        if self.started {
            return Err(NetError::InvalidConfig("interface already started"));
        }
        if mac[0] & 0x01 != 0 {
            return Err(NetError::InvalidConfig("station address must be unicast"));
        }
        if mac == [0; 6] {
            return Err(NetError::InvalidConfig("station address must not be zero"));
        }
        if mtu < MIN_MTU {
            return Err(NetError::InvalidConfig("mtu below IPv4 minimum"));
        }

        let max_frame = mtu as usize + ETH_HEADER_LEN;
        if max_frame > self.config.tx_capacity() {
            return Err(NetError::InvalidConfig("mtu exceeds transmit ring capacity"));
        }
        if max_frame > self.config.scratch_buffer_size {
            return Err(NetError::InvalidConfig("mtu exceeds scratch buffer size"));
        }

        self.engine.set_mac_address(mac);
        self.iface.mac = mac;
        self.iface.mtu = mtu;
        self.iface.flags = flags;
        self.transmitter.set_max_frame_len(max_frame);

        info!(
            "{}{}: mac {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x} mtu {}",
            self.iface.name[0] as char,
            self.iface.name[1] as char,
            mac[0],
            mac[1],
            mac[2],
            mac[3],
            mac[4],
            mac[5],
            mtu
        );
        Ok(())
    }

    /// Enable the MAC and DMA
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.engine.start();
        self.transmitter.mark_started();
        self.started = true;
        info!(
            "{}{}: started, {} rx / {} tx descriptors",
            self.iface.name[0] as char,
            self.iface.name[1] as char,
            self.rx_ring.len(),
            self.tx_ring.len()
        );
    }

    /// The receive task; available exactly once
    pub fn receive_worker<S: StackInput>(&mut self, stack: S) -> Result<ReceiveWorker<E, C, S>, NetError> {
        if self.worker_taken {
            return Err(NetError::WorkerTaken);
        }
        self.worker_taken = true;

        let upper = UpperLayer::new(stack, self.iface.id, self.config.accept_pppoe, self.stats.clone());
        Ok(ReceiveWorker::new(
            self.rx_ring.clone(),
            self.engine.clone(),
            self.bridge.clone(),
            self.pool.clone(),
            upper,
            self.clock.clone(),
            self.config.rx_wait_timeout,
            self.stats.clone(),
        ))
    }

    pub fn transmitter(&self) -> Arc<TransmitPath<E, C>> {
        self.transmitter.clone()
    }

    pub fn interrupt_bridge(&self) -> Arc<InterruptBridge> {
        self.bridge.clone()
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn interface(&self) -> &InterfaceConfig {
        &self.iface
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn rx_ring(&self) -> &DescriptorRing {
        &self.rx_ring
    }

    pub fn tx_ring(&self) -> &DescriptorRing {
        &self.tx_ring
    }

    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }
}
