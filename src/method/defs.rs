//! The AMQP 0-9-1 method catalog.
//!
//! Static data only: one `MethodSpec` per protocol method, grouped by
//! class, plus the class-id and reply-code constants. The codec itself
//! never special-cases any entry here; everything it needs to encode,
//! decode, and route a method is in the spec.
//!
//! Response sets follow the protocol's synchronous-request declarations.
//! A request carries the ids of the methods that may answer it
//! (`Basic.Get` has two); replies and fire-and-forget methods carry none
//! and are therefore asynchronous.

use crate::method::spec::{FieldSpec, MethodSpec};
use crate::wire::WireType::{Bit, Long, LongLong, LongStr, Octet, Short, ShortStr, Table};

/// Connection class id.
pub const CLASS_CONNECTION: u16 = 10;
/// Channel class id.
pub const CLASS_CHANNEL: u16 = 20;
/// Exchange class id.
pub const CLASS_EXCHANGE: u16 = 40;
/// Queue class id.
pub const CLASS_QUEUE: u16 = 50;
/// Basic (message transfer) class id.
pub const CLASS_BASIC: u16 = 60;
/// Confirm (publisher acknowledgements) class id.
pub const CLASS_CONFIRM: u16 = 85;
/// Tx (transaction) class id.
pub const CLASS_TX: u16 = 90;

const fn field(name: &'static str, ty: crate::wire::WireType) -> FieldSpec {
    FieldSpec::new(name, ty)
}

/// Connection class: protocol negotiation and connection lifecycle.
/// All of these travel on channel 0.
pub mod connection {
    use super::*;

    pub static START: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 10,
        name: "Connection.Start",
        fields: &[
            field("version_major", Octet),
            field("version_minor", Octet),
            field("server_properties", Table),
            field("mechanisms", LongStr),
            field("locales", LongStr),
        ],
        responses: &[(CLASS_CONNECTION, 11)],
    };

    pub static START_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 11,
        name: "Connection.StartOk",
        fields: &[
            field("client_properties", Table),
            field("mechanism", ShortStr),
            field("response", LongStr),
            field("locale", ShortStr),
        ],
        responses: &[],
    };

    pub static SECURE: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 20,
        name: "Connection.Secure",
        fields: &[field("challenge", LongStr)],
        responses: &[(CLASS_CONNECTION, 21)],
    };

    pub static SECURE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 21,
        name: "Connection.SecureOk",
        fields: &[field("response", LongStr)],
        responses: &[],
    };

    pub static TUNE: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 30,
        name: "Connection.Tune",
        fields: &[
            field("channel_max", Short),
            field("frame_max", Long),
            field("heartbeat", Short),
        ],
        responses: &[(CLASS_CONNECTION, 31)],
    };

    pub static TUNE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 31,
        name: "Connection.TuneOk",
        fields: &[
            field("channel_max", Short),
            field("frame_max", Long),
            field("heartbeat", Short),
        ],
        responses: &[],
    };

    pub static OPEN: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 40,
        name: "Connection.Open",
        fields: &[
            field("virtual_host", ShortStr),
            field("reserved_1", ShortStr),
            field("reserved_2", Bit),
        ],
        responses: &[(CLASS_CONNECTION, 41)],
    };

    pub static OPEN_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 41,
        name: "Connection.OpenOk",
        fields: &[field("reserved_1", ShortStr)],
        responses: &[],
    };

    pub static CLOSE: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 50,
        name: "Connection.Close",
        fields: &[
            field("reply_code", Short),
            field("reply_text", ShortStr),
            field("class_id", Short),
            field("method_id", Short),
        ],
        responses: &[(CLASS_CONNECTION, 51)],
    };

    pub static CLOSE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONNECTION,
        method_id: 51,
        name: "Connection.CloseOk",
        fields: &[],
        responses: &[],
    };
}

/// Channel class: opening, flow control, and closing of channels.
pub mod channel {
    use super::*;

    pub static OPEN: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 10,
        name: "Channel.Open",
        fields: &[field("reserved_1", ShortStr)],
        responses: &[(CLASS_CHANNEL, 11)],
    };

    pub static OPEN_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 11,
        name: "Channel.OpenOk",
        fields: &[field("reserved_1", LongStr)],
        responses: &[],
    };

    pub static FLOW: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 20,
        name: "Channel.Flow",
        fields: &[field("active", Bit)],
        responses: &[(CLASS_CHANNEL, 21)],
    };

    pub static FLOW_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 21,
        name: "Channel.FlowOk",
        fields: &[field("active", Bit)],
        responses: &[],
    };

    pub static CLOSE: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 40,
        name: "Channel.Close",
        fields: &[
            field("reply_code", Short),
            field("reply_text", ShortStr),
            field("class_id", Short),
            field("method_id", Short),
        ],
        responses: &[(CLASS_CHANNEL, 41)],
    };

    pub static CLOSE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CHANNEL,
        method_id: 41,
        name: "Channel.CloseOk",
        fields: &[],
        responses: &[],
    };
}

/// Exchange class: declaration and binding of exchanges.
pub mod exchange {
    use super::*;

    pub static DECLARE: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 10,
        name: "Exchange.Declare",
        fields: &[
            field("reserved_1", Short),
            field("exchange", ShortStr),
            field("type", ShortStr),
            field("passive", Bit),
            field("durable", Bit),
            field("auto_delete", Bit),
            field("internal", Bit),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_EXCHANGE, 11)],
    };

    pub static DECLARE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 11,
        name: "Exchange.DeclareOk",
        fields: &[],
        responses: &[],
    };

    pub static DELETE: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 20,
        name: "Exchange.Delete",
        fields: &[
            field("reserved_1", Short),
            field("exchange", ShortStr),
            field("if_unused", Bit),
            field("no_wait", Bit),
        ],
        responses: &[(CLASS_EXCHANGE, 21)],
    };

    pub static DELETE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 21,
        name: "Exchange.DeleteOk",
        fields: &[],
        responses: &[],
    };

    pub static BIND: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 30,
        name: "Exchange.Bind",
        fields: &[
            field("reserved_1", Short),
            field("destination", ShortStr),
            field("source", ShortStr),
            field("routing_key", ShortStr),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_EXCHANGE, 31)],
    };

    pub static BIND_OK: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 31,
        name: "Exchange.BindOk",
        fields: &[],
        responses: &[],
    };

    // UnbindOk is method 51, not 41; the 0-9-1 extended grammar skips a
    // slot here.
    pub static UNBIND: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 40,
        name: "Exchange.Unbind",
        fields: &[
            field("reserved_1", Short),
            field("destination", ShortStr),
            field("source", ShortStr),
            field("routing_key", ShortStr),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_EXCHANGE, 51)],
    };

    pub static UNBIND_OK: MethodSpec = MethodSpec {
        class_id: CLASS_EXCHANGE,
        method_id: 51,
        name: "Exchange.UnbindOk",
        fields: &[],
        responses: &[],
    };
}

/// Queue class: declaration, binding, purging and deletion of queues.
pub mod queue {
    use super::*;

    pub static DECLARE: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 10,
        name: "Queue.Declare",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("passive", Bit),
            field("durable", Bit),
            field("exclusive", Bit),
            field("auto_delete", Bit),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_QUEUE, 11)],
    };

    pub static DECLARE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 11,
        name: "Queue.DeclareOk",
        fields: &[
            field("queue", ShortStr),
            field("message_count", Long),
            field("consumer_count", Long),
        ],
        responses: &[],
    };

    pub static BIND: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 20,
        name: "Queue.Bind",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_QUEUE, 21)],
    };

    pub static BIND_OK: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 21,
        name: "Queue.BindOk",
        fields: &[],
        responses: &[],
    };

    pub static PURGE: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 30,
        name: "Queue.Purge",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("no_wait", Bit),
        ],
        responses: &[(CLASS_QUEUE, 31)],
    };

    pub static PURGE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 31,
        name: "Queue.PurgeOk",
        fields: &[field("message_count", Long)],
        responses: &[],
    };

    pub static DELETE: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 40,
        name: "Queue.Delete",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("if_unused", Bit),
            field("if_empty", Bit),
            field("no_wait", Bit),
        ],
        responses: &[(CLASS_QUEUE, 41)],
    };

    pub static DELETE_OK: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 41,
        name: "Queue.DeleteOk",
        fields: &[field("message_count", Long)],
        responses: &[],
    };

    // Queue.Unbind has no no_wait bit; it is always confirmed.
    pub static UNBIND: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 50,
        name: "Queue.Unbind",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
            field("arguments", Table),
        ],
        responses: &[(CLASS_QUEUE, 51)],
    };

    pub static UNBIND_OK: MethodSpec = MethodSpec {
        class_id: CLASS_QUEUE,
        method_id: 51,
        name: "Queue.UnbindOk",
        fields: &[],
        responses: &[],
    };
}

/// Basic class: message transfer.
///
/// Most of this class is asynchronous traffic (`Publish`, `Deliver`,
/// `Ack`, ...); the exceptions are the consumer-management dialogues and
/// `Basic.Get`, whose call can be answered by either `GetOk` or
/// `GetEmpty`.
pub mod basic {
    use super::*;

    pub static QOS: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 10,
        name: "Basic.Qos",
        fields: &[
            field("prefetch_size", Long),
            field("prefetch_count", Short),
            field("global", Bit),
        ],
        responses: &[(CLASS_BASIC, 11)],
    };

    pub static QOS_OK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 11,
        name: "Basic.QosOk",
        fields: &[],
        responses: &[],
    };

    pub static CONSUME: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 20,
        name: "Basic.Consume",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("consumer_tag", ShortStr),
            field("no_local", Bit),
            field("no_ack", Bit),
            field("exclusive", Bit),
            field("no_wait", Bit),
            field("arguments", Table),
        ],
        responses: &[(CLASS_BASIC, 21)],
    };

    pub static CONSUME_OK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 21,
        name: "Basic.ConsumeOk",
        fields: &[field("consumer_tag", ShortStr)],
        responses: &[],
    };

    pub static CANCEL: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 30,
        name: "Basic.Cancel",
        fields: &[field("consumer_tag", ShortStr), field("no_wait", Bit)],
        responses: &[(CLASS_BASIC, 31)],
    };

    pub static CANCEL_OK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 31,
        name: "Basic.CancelOk",
        fields: &[field("consumer_tag", ShortStr)],
        responses: &[],
    };

    pub static PUBLISH: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 40,
        name: "Basic.Publish",
        fields: &[
            field("reserved_1", Short),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
            field("mandatory", Bit),
            field("immediate", Bit),
        ],
        responses: &[],
    };

    pub static RETURN: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 50,
        name: "Basic.Return",
        fields: &[
            field("reply_code", Short),
            field("reply_text", ShortStr),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
        ],
        responses: &[],
    };

    pub static DELIVER: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 60,
        name: "Basic.Deliver",
        fields: &[
            field("consumer_tag", ShortStr),
            field("delivery_tag", LongLong),
            field("redelivered", Bit),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
        ],
        responses: &[],
    };

    pub static GET: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 70,
        name: "Basic.Get",
        fields: &[
            field("reserved_1", Short),
            field("queue", ShortStr),
            field("no_ack", Bit),
        ],
        responses: &[(CLASS_BASIC, 71), (CLASS_BASIC, 72)],
    };

    pub static GET_OK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 71,
        name: "Basic.GetOk",
        fields: &[
            field("delivery_tag", LongLong),
            field("redelivered", Bit),
            field("exchange", ShortStr),
            field("routing_key", ShortStr),
            field("message_count", Long),
        ],
        responses: &[],
    };

    pub static GET_EMPTY: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 72,
        name: "Basic.GetEmpty",
        fields: &[field("reserved_1", ShortStr)],
        responses: &[],
    };

    pub static ACK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 80,
        name: "Basic.Ack",
        fields: &[field("delivery_tag", LongLong), field("multiple", Bit)],
        responses: &[],
    };

    pub static REJECT: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 90,
        name: "Basic.Reject",
        fields: &[field("delivery_tag", LongLong), field("requeue", Bit)],
        responses: &[],
    };

    /// Deprecated in favour of the confirmed `Basic.Recover`.
    pub static RECOVER_ASYNC: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 100,
        name: "Basic.RecoverAsync",
        fields: &[field("requeue", Bit)],
        responses: &[],
    };

    pub static RECOVER: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 110,
        name: "Basic.Recover",
        fields: &[field("requeue", Bit)],
        responses: &[(CLASS_BASIC, 111)],
    };

    pub static RECOVER_OK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 111,
        name: "Basic.RecoverOk",
        fields: &[],
        responses: &[],
    };

    pub static NACK: MethodSpec = MethodSpec {
        class_id: CLASS_BASIC,
        method_id: 120,
        name: "Basic.Nack",
        fields: &[
            field("delivery_tag", LongLong),
            field("multiple", Bit),
            field("requeue", Bit),
        ],
        responses: &[],
    };
}

/// Confirm class: publisher acknowledgements.
pub mod confirm {
    use super::*;

    pub static SELECT: MethodSpec = MethodSpec {
        class_id: CLASS_CONFIRM,
        method_id: 10,
        name: "Confirm.Select",
        fields: &[field("nowait", Bit)],
        responses: &[(CLASS_CONFIRM, 11)],
    };

    pub static SELECT_OK: MethodSpec = MethodSpec {
        class_id: CLASS_CONFIRM,
        method_id: 11,
        name: "Confirm.SelectOk",
        fields: &[],
        responses: &[],
    };
}

/// Tx class: standard transactions. Every method is a bare dialogue.
pub mod tx {
    use super::*;

    pub static SELECT: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 10,
        name: "Tx.Select",
        fields: &[],
        responses: &[(CLASS_TX, 11)],
    };

    pub static SELECT_OK: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 11,
        name: "Tx.SelectOk",
        fields: &[],
        responses: &[],
    };

    pub static COMMIT: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 20,
        name: "Tx.Commit",
        fields: &[],
        responses: &[(CLASS_TX, 21)],
    };

    pub static COMMIT_OK: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 21,
        name: "Tx.CommitOk",
        fields: &[],
        responses: &[],
    };

    pub static ROLLBACK: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 30,
        name: "Tx.Rollback",
        fields: &[],
        responses: &[(CLASS_TX, 31)],
    };

    pub static ROLLBACK_OK: MethodSpec = MethodSpec {
        class_id: CLASS_TX,
        method_id: 31,
        name: "Tx.RollbackOk",
        fields: &[],
        responses: &[],
    };
}

/// Every method in the catalog, in class/method order.
pub static ALL: &[&MethodSpec] = &[
    &connection::START,
    &connection::START_OK,
    &connection::SECURE,
    &connection::SECURE_OK,
    &connection::TUNE,
    &connection::TUNE_OK,
    &connection::OPEN,
    &connection::OPEN_OK,
    &connection::CLOSE,
    &connection::CLOSE_OK,
    &channel::OPEN,
    &channel::OPEN_OK,
    &channel::FLOW,
    &channel::FLOW_OK,
    &channel::CLOSE,
    &channel::CLOSE_OK,
    &exchange::DECLARE,
    &exchange::DECLARE_OK,
    &exchange::DELETE,
    &exchange::DELETE_OK,
    &exchange::BIND,
    &exchange::BIND_OK,
    &exchange::UNBIND,
    &exchange::UNBIND_OK,
    &queue::DECLARE,
    &queue::DECLARE_OK,
    &queue::BIND,
    &queue::BIND_OK,
    &queue::PURGE,
    &queue::PURGE_OK,
    &queue::DELETE,
    &queue::DELETE_OK,
    &queue::UNBIND,
    &queue::UNBIND_OK,
    &basic::QOS,
    &basic::QOS_OK,
    &basic::CONSUME,
    &basic::CONSUME_OK,
    &basic::CANCEL,
    &basic::CANCEL_OK,
    &basic::PUBLISH,
    &basic::RETURN,
    &basic::DELIVER,
    &basic::GET,
    &basic::GET_OK,
    &basic::GET_EMPTY,
    &basic::ACK,
    &basic::REJECT,
    &basic::RECOVER_ASYNC,
    &basic::RECOVER,
    &basic::RECOVER_OK,
    &basic::NACK,
    &confirm::SELECT,
    &confirm::SELECT_OK,
    &tx::SELECT,
    &tx::SELECT_OK,
    &tx::COMMIT,
    &tx::COMMIT_OK,
    &tx::ROLLBACK,
    &tx::ROLLBACK_OK,
];

/// Reply codes carried by `Connection.Close` / `Channel.Close` and
/// `Basic.Return`. 2xx is success, 3xx/4xx are channel errors, 5xx are
/// connection errors.
pub mod reply_code {
    pub const REPLY_SUCCESS: u16 = 200;
    pub const CONTENT_TOO_LARGE: u16 = 311;
    pub const NO_CONSUMERS: u16 = 313;
    pub const CONNECTION_FORCED: u16 = 320;
    pub const INVALID_PATH: u16 = 402;
    pub const ACCESS_REFUSED: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const RESOURCE_LOCKED: u16 = 405;
    pub const PRECONDITION_FAILED: u16 = 406;
    pub const FRAME_ERROR: u16 = 501;
    pub const SYNTAX_ERROR: u16 = 502;
    pub const COMMAND_INVALID: u16 = 503;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const UNEXPECTED_FRAME: u16 = 505;
    pub const RESOURCE_ERROR: u16 = 506;
    pub const NOT_ALLOWED: u16 = 530;
    pub const NOT_IMPLEMENTED: u16 = 540;
    pub const INTERNAL_ERROR: u16 = 541;
}
