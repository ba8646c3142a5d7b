/// Lifecycle of a connection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, or a fatal error tore the connection down.
    Closed,
    /// SYN sent, awaiting SYN|ACK.
    SynSent,
    /// SYN|ACK sent, awaiting the completing ACK.
    SynRcvd,
    /// Data phase.
    Established,
    /// FIN sent, awaiting the peer's ACK and FIN.
    FinSent,
    /// Peer's FIN acknowledged; our own FIN is about to go out.
    CloseWait,
    /// Our FIN sent, awaiting the final ACK.
    LastAck,
    /// Clean shutdown completed.
    Done,
}
