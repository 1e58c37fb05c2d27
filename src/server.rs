//! Order server: the exchange's client-facing edge.
//!
//! Each poll round reads every client connection, validates the framing
//! that protects the matching engine, and hands good requests to the
//! [`FifoSequencer`] with their receive timestamps; at end of round the
//! sequenced batch goes to the engine. Responses coming back are stamped
//! with the owning client's outgoing sequence number and written to that
//! client's connection.
//!
//! Everything rejected here is a protocol error: logged and dropped,
//! never fatal. That includes requests with a sequence gap, requests for
//! a client first seen on a different connection, out-of-range ids and
//! undecodable frames.

use tracing::warn;

use crate::protocol::{
    ClientRequest, ClientRequestType, ClientResponse, SeqClientRequest, SeqClientResponse,
};
use crate::sequencer::FifoSequencer;
use crate::spsc::{Consumer, Producer};
use crate::transport::{PacketRx, PacketTx, MAX_FRAME_LEN};
use crate::types::{Nanos, MAX_CLIENTS, MAX_TICKERS};

/// One client connection: its receive and send halves.
pub struct ClientConn<R: PacketRx, T: PacketTx> {
    pub rx: R,
    pub tx: T,
}

pub struct OrderServer {
    sequencer: FifoSequencer,
    to_engine: Producer<ClientRequest>,
    from_engine: Consumer<ClientResponse>,
    /// Next sequence number expected from each client, from 1.
    next_exp_seq: Vec<u64>,
    /// Next sequence number stamped on each client's responses, from 1.
    next_out_seq: Vec<u64>,
    /// Connection slot a client was first seen on.
    client_conn: Vec<Option<usize>>,
}

impl OrderServer {
    pub fn new(to_engine: Producer<ClientRequest>, from_engine: Consumer<ClientResponse>) -> Self {
        Self {
            sequencer: FifoSequencer::new(),
            to_engine,
            from_engine,
            next_exp_seq: vec![1; MAX_CLIENTS],
            next_out_seq: vec![1; MAX_CLIENTS],
            client_conn: vec![None; MAX_CLIENTS],
        }
    }

    /// One service round over the given connections: drain ingress,
    /// sequence and publish, then flush responses. Connection slots must
    /// be stable across rounds; a client stays bound to the slot it was
    /// first seen on.
    pub fn poll<R: PacketRx, T: PacketTx>(&mut self, conns: &mut [ClientConn<R, T>]) {
        self.read_round(conns);
        self.sequencer.sequence_and_publish(&mut self.to_engine);
        self.flush_responses(conns);
    }

    /// Service loop: poll rounds until `running` clears.
    pub fn run<R: PacketRx, T: PacketTx>(
        &mut self,
        running: &std::sync::atomic::AtomicBool,
        conns: &mut [ClientConn<R, T>],
    ) {
        while running.load(std::sync::atomic::Ordering::Acquire) {
            self.poll(conns);
            std::hint::spin_loop();
        }
    }

    fn read_round<R: PacketRx, T: PacketTx>(&mut self, conns: &mut [ClientConn<R, T>]) {
        let mut buf = [0u8; MAX_FRAME_LEN];
        for slot in 0..conns.len() {
            while let Some((len, recv_time)) = conns[slot].rx.recv(&mut buf) {
                let mut at = 0;
                while at + SeqClientRequest::ENCODED_LEN <= len {
                    match SeqClientRequest::decode(&buf[at..]) {
                        Ok(framed) => self.accept(slot, recv_time, &framed),
                        Err(err) => warn!(%err, slot, "dropping undecodable client request"),
                    }
                    at += SeqClientRequest::ENCODED_LEN;
                }
                if at != len {
                    warn!(slot, trailing = len - at, "dropping partial client request frame");
                }
            }
        }
    }

    /// Validates one decoded request and stages it for sequencing.
    fn accept(&mut self, slot: usize, recv_time: Nanos, framed: &SeqClientRequest) {
        let request = framed.request;
        let client_id = request.client_id as usize;

        if client_id >= MAX_CLIENTS {
            warn!(client_id, "dropping request with out-of-range client id");
            return;
        }
        if request.ticker_id as usize >= MAX_TICKERS {
            warn!(client_id, ticker_id = request.ticker_id, "dropping request for unknown ticker");
            return;
        }
        if request.req_type == ClientRequestType::Invalid {
            warn!(client_id, "dropping request with invalid type");
            return;
        }

        match self.client_conn[client_id] {
            None => self.client_conn[client_id] = Some(slot),
            Some(bound) if bound != slot => {
                warn!(client_id, bound, slot, "dropping request from wrong connection");
                return;
            }
            Some(_) => {}
        }

        let expected = self.next_exp_seq[client_id];
        if framed.seq != expected {
            warn!(client_id, expected, received = framed.seq, "sequence gap on client ingress");
            return;
        }
        self.next_exp_seq[client_id] = expected + 1;

        self.sequencer.add(recv_time, request);
    }

    fn flush_responses<R: PacketRx, T: PacketTx>(&mut self, conns: &mut [ClientConn<R, T>]) {
        let mut out = [0u8; SeqClientResponse::ENCODED_LEN];
        while let Some(response) = self.from_engine.read_slot() {
            let response = *response;
            self.from_engine.commit_read();

            let client_id = response.client_id as usize;
            let slot = self.client_conn[client_id]
                .unwrap_or_else(|| panic!("response for client {client_id} with no connection"));

            let seq = self.next_out_seq[client_id];
            self.next_out_seq[client_id] += 1;
            SeqClientResponse { seq, response }.encode(&mut out);
            conns[slot].tx.send(&out);
        }
    }
}
