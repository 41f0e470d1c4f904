//! AMQP 0-9-1 method catalog.
//!
//! Every method is declared once in the [`amqp_methods!`] table below with
//! its class id, method id, display name and argument layout. The macro
//! generates the argument structs, the [`Method`] enum and its codec.
//! Consecutive `bit` arguments share one octet, least significant bit first.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::table::{put_longstr, put_shortstr, read_longstr, read_shortstr, FieldTable};
use crate::error::{AmqpError, AmqpResult};
use crate::wire::WireReader;

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;
pub const CLASS_CONFIRM: u16 = 85;
pub const CLASS_TX: u16 = 90;

const KNOWN_CLASSES: [u16; 7] = [
    CLASS_CONNECTION,
    CLASS_CHANNEL,
    CLASS_EXCHANGE,
    CLASS_QUEUE,
    CLASS_BASIC,
    CLASS_CONFIRM,
    CLASS_TX,
];

/// Sequential argument reader with bit packing.
struct ArgReader {
    reader: WireReader<Bytes>,
    bits: u8,
    bit_index: u8,
}

impl ArgReader {
    fn new(args: Bytes) -> Self {
        Self {
            reader: WireReader::new(args),
            bits: 0,
            bit_index: 8,
        }
    }

    fn bit(&mut self) -> AmqpResult<bool> {
        if self.bit_index >= 8 {
            self.bits = self.reader.read_u8()?;
            self.bit_index = 0;
        }
        let value = self.bits & (1 << self.bit_index) != 0;
        self.bit_index += 1;
        Ok(value)
    }

    fn octet(&mut self) -> AmqpResult<u8> {
        self.bit_index = 8;
        Ok(self.reader.read_u8()?)
    }

    fn short(&mut self) -> AmqpResult<u16> {
        self.bit_index = 8;
        Ok(self.reader.read_u16()?)
    }

    fn long(&mut self) -> AmqpResult<u32> {
        self.bit_index = 8;
        Ok(self.reader.read_u32()?)
    }

    fn longlong(&mut self) -> AmqpResult<u64> {
        self.bit_index = 8;
        Ok(self.reader.read_u64()?)
    }

    fn shortstr(&mut self) -> AmqpResult<String> {
        self.bit_index = 8;
        read_shortstr(&mut self.reader)
    }

    fn longstr(&mut self) -> AmqpResult<String> {
        self.bit_index = 8;
        read_longstr(&mut self.reader)
    }

    fn table(&mut self) -> AmqpResult<FieldTable> {
        self.bit_index = 8;
        FieldTable::decode(&mut self.reader)
    }
}

/// Sequential argument writer with bit packing.
struct ArgWriter<'a> {
    buf: &'a mut BytesMut,
    bits: u8,
    bit_index: u8,
}

impl<'a> ArgWriter<'a> {
    fn new(buf: &'a mut BytesMut) -> Self {
        Self {
            buf,
            bits: 0,
            bit_index: 0,
        }
    }

    fn flush_bits(&mut self) {
        if self.bit_index > 0 {
            self.buf.put_u8(self.bits);
            self.bits = 0;
            self.bit_index = 0;
        }
    }

    fn bit(&mut self, value: &bool) {
        if self.bit_index == 8 {
            self.flush_bits();
        }
        if *value {
            self.bits |= 1 << self.bit_index;
        }
        self.bit_index += 1;
    }

    fn octet(&mut self, value: &u8) {
        self.flush_bits();
        self.buf.put_u8(*value);
    }

    fn short(&mut self, value: &u16) {
        self.flush_bits();
        self.buf.put_u16(*value);
    }

    fn long(&mut self, value: &u32) {
        self.flush_bits();
        self.buf.put_u32(*value);
    }

    fn longlong(&mut self, value: &u64) {
        self.flush_bits();
        self.buf.put_u64(*value);
    }

    fn shortstr(&mut self, value: &str) {
        self.flush_bits();
        put_shortstr(self.buf, value);
    }

    fn longstr(&mut self, value: &str) {
        self.flush_bits();
        put_longstr(self.buf, value);
    }

    fn table(&mut self, value: &FieldTable) {
        self.flush_bits();
        value.encode(self.buf);
    }
}

macro_rules! arg_type {
    (bit) => { bool };
    (octet) => { u8 };
    (short) => { u16 };
    (long) => { u32 };
    (longlong) => { u64 };
    (shortstr) => { String };
    (longstr) => { String };
    (table) => { FieldTable };
}

/// A non-default value for each argument type.
#[cfg(test)]
macro_rules! arg_sample {
    (bit) => { true };
    (octet) => { 0x7F };
    (short) => { 0x1234 };
    (long) => { 0x0102_0304 };
    (longlong) => { 0x0102_0304_0506_0708 };
    (shortstr) => { String::from("short") };
    (longstr) => { String::from("a longer string") };
    (table) => {{
        let mut table = FieldTable::new();
        table.insert("x-arg", super::table::FieldValue::Int(-1));
        table
    }};
}

macro_rules! amqp_methods {
    ($(
        $variant:ident = ($class:literal, $method:literal, $name:literal) {
            $($(#[$fmeta:meta])* $field:ident : $kind:ident),* $(,)?
        }
    )*) => {
        $(
            #[doc = concat!("Arguments of `", $name, "`.")]
            #[derive(Debug, Clone, PartialEq, Default, Serialize)]
            #[serde(rename_all = "camelCase")]
            pub struct $variant {
                $($(#[$fmeta])* pub $field: arg_type!($kind),)*
            }
        )*

        /// A decoded AMQP method with its arguments.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum Method {
            $($variant($variant),)*
        }

        impl Method {
            #[must_use]
            pub fn class_id(&self) -> u16 {
                match self {
                    $(Self::$variant(_) => $class,)*
                }
            }

            #[must_use]
            pub fn method_id(&self) -> u16 {
                match self {
                    $(Self::$variant(_) => $method,)*
                }
            }

            /// Display name, e.g. `"queue declare-ok"`.
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $name,)*
                }
            }

            /// Decode the arguments of method `(class_id, method_id)`.
            ///
            /// # Errors
            ///
            /// Returns [`AmqpError::UnknownClass`] or
            /// [`AmqpError::UnknownMethod`] for ids outside the catalog and
            /// [`AmqpError::Syntax`] when the arguments are truncated.
            pub fn decode(class_id: u16, method_id: u16, args: Bytes) -> AmqpResult<Self> {
                #[allow(unused_mut, unused_variables)]
                let mut r = ArgReader::new(args);
                match (class_id, method_id) {
                    $(
                        ($class, $method) => Ok(Self::$variant($variant {
                            $($field: r.$kind()?,)*
                        })),
                    )*
                    _ if KNOWN_CLASSES.contains(&class_id) => {
                        Err(AmqpError::UnknownMethod { class_id, method_id })
                    }
                    _ => Err(AmqpError::UnknownClass { class_id }),
                }
            }

            /// Encode class id, method id and arguments.
            pub fn encode(&self, buf: &mut BytesMut) {
                buf.put_u16(self.class_id());
                buf.put_u16(self.method_id());
                let mut w = ArgWriter::new(buf);
                match self {
                    $(
                        #[allow(unused_variables)]
                        Self::$variant(m) => {
                            $(w.$kind(&m.$field);)*
                        }
                    )*
                }
                w.flush_bits();
            }

            /// One instance of every method, each argument set to a
            /// non-default value.
            #[cfg(test)]
            fn every_method() -> Vec<Self> {
                vec![$(
                    Self::$variant($variant {
                        $($field: arg_sample!($kind),)*
                    }),
                )*]
            }
        }
    };
}

amqp_methods! {
    ConnectionStart = (10, 10, "connection start") {
        version_major: octet,
        version_minor: octet,
        server_properties: table,
        mechanisms: longstr,
        locales: longstr,
    }
    ConnectionStartOk = (10, 11, "connection start-ok") {
        client_properties: table,
        mechanism: shortstr,
        response: longstr,
        locale: shortstr,
    }
    ConnectionSecure = (10, 20, "connection secure") { challenge: longstr }
    ConnectionSecureOk = (10, 21, "connection secure-ok") { response: longstr }
    ConnectionTune = (10, 30, "connection tune") {
        channel_max: short,
        frame_max: long,
        heartbeat: short,
    }
    ConnectionTuneOk = (10, 31, "connection tune-ok") {
        channel_max: short,
        frame_max: long,
        heartbeat: short,
    }
    ConnectionOpen = (10, 40, "connection open") {
        virtual_host: shortstr,
        #[serde(skip)] reserved1: shortstr,
        #[serde(skip)] reserved2: bit,
    }
    ConnectionOpenOk = (10, 41, "connection open-ok") { #[serde(skip)] reserved1: shortstr }
    ConnectionClose = (10, 50, "connection close") {
        reply_code: short,
        reply_text: shortstr,
        class_id: short,
        method_id: short,
    }
    ConnectionCloseOk = (10, 51, "connection close-ok") {}
    ConnectionBlocked = (10, 60, "connection blocked") { reason: shortstr }
    ConnectionUnblocked = (10, 61, "connection unblocked") {}

    ChannelOpen = (20, 10, "channel open") { #[serde(skip)] reserved1: shortstr }
    ChannelOpenOk = (20, 11, "channel open-ok") { #[serde(skip)] reserved1: longstr }
    ChannelFlow = (20, 20, "channel flow") { active: bit }
    ChannelFlowOk = (20, 21, "channel flow-ok") { active: bit }
    ChannelClose = (20, 40, "channel close") {
        reply_code: short,
        reply_text: shortstr,
        class_id: short,
        method_id: short,
    }
    ChannelCloseOk = (20, 41, "channel close-ok") {}

    ExchangeDeclare = (40, 10, "exchange declare") {
        #[serde(skip)] reserved1: short,
        exchange: shortstr,
        r#type: shortstr,
        passive: bit,
        durable: bit,
        auto_delete: bit,
        internal: bit,
        no_wait: bit,
        arguments: table,
    }
    ExchangeDeclareOk = (40, 11, "exchange declare-ok") {}
    ExchangeDelete = (40, 20, "exchange delete") {
        #[serde(skip)] reserved1: short,
        exchange: shortstr,
        if_unused: bit,
        no_wait: bit,
    }
    ExchangeDeleteOk = (40, 21, "exchange delete-ok") {}
    ExchangeBind = (40, 30, "exchange bind") {
        #[serde(skip)] reserved1: short,
        destination: shortstr,
        source: shortstr,
        routing_key: shortstr,
        no_wait: bit,
        arguments: table,
    }
    ExchangeBindOk = (40, 31, "exchange bind-ok") {}
    ExchangeUnbind = (40, 40, "exchange unbind") {
        #[serde(skip)] reserved1: short,
        destination: shortstr,
        source: shortstr,
        routing_key: shortstr,
        no_wait: bit,
        arguments: table,
    }
    ExchangeUnbindOk = (40, 51, "exchange unbind-ok") {}

    QueueDeclare = (50, 10, "queue declare") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        passive: bit,
        durable: bit,
        exclusive: bit,
        auto_delete: bit,
        no_wait: bit,
        arguments: table,
    }
    QueueDeclareOk = (50, 11, "queue declare-ok") {
        queue: shortstr,
        message_count: long,
        consumer_count: long,
    }
    QueueBind = (50, 20, "queue bind") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        exchange: shortstr,
        routing_key: shortstr,
        no_wait: bit,
        arguments: table,
    }
    QueueBindOk = (50, 21, "queue bind-ok") {}
    QueuePurge = (50, 30, "queue purge") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        no_wait: bit,
    }
    QueuePurgeOk = (50, 31, "queue purge-ok") { message_count: long }
    QueueDelete = (50, 40, "queue delete") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        if_unused: bit,
        if_empty: bit,
        no_wait: bit,
    }
    QueueDeleteOk = (50, 41, "queue delete-ok") { message_count: long }
    QueueUnbind = (50, 50, "queue unbind") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        exchange: shortstr,
        routing_key: shortstr,
        arguments: table,
    }
    QueueUnbindOk = (50, 51, "queue unbind-ok") {}

    BasicQos = (60, 10, "basic qos") {
        prefetch_size: long,
        prefetch_count: short,
        global: bit,
    }
    BasicQosOk = (60, 11, "basic qos-ok") {}
    BasicConsume = (60, 20, "basic consume") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        consumer_tag: shortstr,
        no_local: bit,
        no_ack: bit,
        exclusive: bit,
        no_wait: bit,
        arguments: table,
    }
    BasicConsumeOk = (60, 21, "basic consume-ok") { consumer_tag: shortstr }
    BasicCancel = (60, 30, "basic cancel") {
        consumer_tag: shortstr,
        no_wait: bit,
    }
    BasicCancelOk = (60, 31, "basic cancel-ok") { consumer_tag: shortstr }
    BasicPublish = (60, 40, "basic publish") {
        #[serde(skip)] reserved1: short,
        exchange: shortstr,
        routing_key: shortstr,
        mandatory: bit,
        immediate: bit,
    }
    BasicReturn = (60, 50, "basic return") {
        reply_code: short,
        reply_text: shortstr,
        exchange: shortstr,
        routing_key: shortstr,
    }
    BasicDeliver = (60, 60, "basic deliver") {
        consumer_tag: shortstr,
        delivery_tag: longlong,
        redelivered: bit,
        exchange: shortstr,
        routing_key: shortstr,
    }
    BasicGet = (60, 70, "basic get") {
        #[serde(skip)] reserved1: short,
        queue: shortstr,
        no_ack: bit,
    }
    BasicGetOk = (60, 71, "basic get-ok") {
        delivery_tag: longlong,
        redelivered: bit,
        exchange: shortstr,
        routing_key: shortstr,
        message_count: long,
    }
    BasicGetEmpty = (60, 72, "basic get-empty") { #[serde(skip)] reserved1: shortstr }
    BasicAck = (60, 80, "basic ack") {
        delivery_tag: longlong,
        multiple: bit,
    }
    BasicReject = (60, 90, "basic reject") {
        delivery_tag: longlong,
        requeue: bit,
    }
    BasicRecoverAsync = (60, 100, "basic recover-async") { requeue: bit }
    BasicRecover = (60, 110, "basic recover") { requeue: bit }
    BasicRecoverOk = (60, 111, "basic recover-ok") {}
    BasicNack = (60, 120, "basic nack") {
        delivery_tag: longlong,
        multiple: bit,
        requeue: bit,
    }

    ConfirmSelect = (85, 10, "confirm select") { nowait: bit }
    ConfirmSelectOk = (85, 11, "confirm select-ok") {}

    TxSelect = (90, 10, "tx select") {}
    TxSelectOk = (90, 11, "tx select-ok") {}
    TxCommit = (90, 20, "tx commit") {}
    TxCommitOk = (90, 21, "tx commit-ok") {}
    TxRollback = (90, 30, "tx rollback") {}
    TxRollbackOk = (90, 31, "tx rollback-ok") {}
}

impl Method {
    /// Whether the sender expects a synchronous reply.
    #[must_use]
    pub fn wait(&self) -> bool {
        match self {
            Self::ExchangeDeclare(m) => !m.no_wait,
            Self::ExchangeDelete(m) => !m.no_wait,
            Self::ExchangeBind(m) => !m.no_wait,
            Self::ExchangeUnbind(m) => !m.no_wait,
            Self::QueueDeclare(m) => !m.no_wait,
            Self::QueueBind(m) => !m.no_wait,
            Self::QueuePurge(m) => !m.no_wait,
            Self::QueueDelete(m) => !m.no_wait,
            Self::BasicConsume(m) => !m.no_wait,
            Self::BasicCancel(m) => !m.no_wait,
            Self::ConfirmSelect(m) => !m.nowait,
            Self::ConnectionStart(_)
            | Self::ConnectionSecure(_)
            | Self::ConnectionTune(_)
            | Self::ConnectionOpen(_)
            | Self::ConnectionClose(_)
            | Self::ChannelOpen(_)
            | Self::ChannelFlow(_)
            | Self::ChannelClose(_)
            | Self::QueueUnbind(_)
            | Self::BasicQos(_)
            | Self::BasicGet(_)
            | Self::BasicRecover(_)
            | Self::TxSelect(_)
            | Self::TxCommit(_)
            | Self::TxRollback(_) => true,
            _ => false,
        }
    }

    /// For a reply, the method id of the request it answers.
    #[must_use]
    pub fn request_method_id(&self) -> Option<u16> {
        match self {
            Self::ConnectionStartOk(_) => Some(10),
            Self::ConnectionSecureOk(_) => Some(20),
            Self::ConnectionTuneOk(_) => Some(30),
            Self::ConnectionOpenOk(_) => Some(40),
            Self::ConnectionCloseOk(_) => Some(50),
            Self::ChannelOpenOk(_) => Some(10),
            Self::ChannelFlowOk(_) => Some(20),
            Self::ChannelCloseOk(_) => Some(40),
            Self::ExchangeDeclareOk(_) => Some(10),
            Self::ExchangeDeleteOk(_) => Some(20),
            Self::ExchangeBindOk(_) => Some(30),
            Self::ExchangeUnbindOk(_) => Some(40),
            Self::QueueDeclareOk(_) => Some(10),
            Self::QueueBindOk(_) => Some(20),
            Self::QueuePurgeOk(_) => Some(30),
            Self::QueueDeleteOk(_) => Some(40),
            Self::QueueUnbindOk(_) => Some(50),
            Self::BasicQosOk(_) => Some(10),
            Self::BasicConsumeOk(_) => Some(20),
            Self::BasicCancelOk(_) => Some(30),
            Self::BasicGetOk(_) | Self::BasicGetEmpty(_) => Some(70),
            Self::BasicRecoverOk(_) => Some(110),
            Self::ConfirmSelectOk(_) => Some(10),
            Self::TxSelectOk(_) => Some(10),
            Self::TxCommitOk(_) => Some(20),
            Self::TxRollbackOk(_) => Some(30),
            _ => None,
        }
    }

    /// Whether a content header and body frames follow this method.
    #[must_use]
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            Self::BasicPublish(_) | Self::BasicReturn(_) | Self::BasicDeliver(_) | Self::BasicGetOk(_)
        )
    }

    /// The argument that best summarizes this method, as
    /// `(path in the message JSON, value)`.
    #[must_use]
    pub fn summary(&self) -> Option<(Option<&'static str>, String)> {
        let exchange = |e: &str| Some((Some("details.exchange"), e.to_string()));
        let queue = |q: &str| Some((Some("details.queue"), q.to_string()));
        match self {
            Self::BasicPublish(m) => exchange(&m.exchange),
            Self::BasicDeliver(m) => exchange(&m.exchange),
            Self::BasicReturn(m) => exchange(&m.exchange),
            Self::BasicGetOk(m) => exchange(&m.exchange),
            Self::ExchangeDeclare(m) => exchange(&m.exchange),
            Self::ExchangeDelete(m) => exchange(&m.exchange),
            Self::QueueDeclare(m) => queue(&m.queue),
            Self::QueueDeclareOk(m) => queue(&m.queue),
            Self::QueueBind(m) => queue(&m.queue),
            Self::QueueUnbind(m) => queue(&m.queue),
            Self::QueuePurge(m) => queue(&m.queue),
            Self::QueueDelete(m) => queue(&m.queue),
            Self::BasicConsume(m) => queue(&m.queue),
            Self::BasicGet(m) => queue(&m.queue),
            Self::ConnectionStart(m) => {
                Some((None, format!("{}.{}", m.version_major, m.version_minor)))
            }
            Self::ConnectionClose(m) => Some((Some("details.replyText"), m.reply_text.clone())),
            Self::ChannelClose(m) => Some((Some("details.replyText"), m.reply_text.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::table::FieldValue;
    use serde_json::json;

    fn encoded(method: &Method) -> Bytes {
        let mut buf = BytesMut::new();
        method.encode(&mut buf);
        buf.freeze()
    }

    fn decode_encoded(method: &Method) -> Method {
        let mut reader = WireReader::new(encoded(method));
        let class_id = reader.read_u16().unwrap();
        let method_id = reader.read_u16().unwrap();
        Method::decode(class_id, method_id, reader.into_inner()).unwrap()
    }

    #[test]
    fn test_queue_declare_bits_pack_into_one_octet() {
        let method = Method::QueueDeclare(QueueDeclare {
            queue: "q1".into(),
            durable: true,
            auto_delete: true,
            no_wait: false,
            ..QueueDeclare::default()
        });
        let bytes = encoded(&method);
        // class, method, reserved, shortstr "q1", bits, empty table
        assert_eq!(bytes.len(), 2 + 2 + 2 + 3 + 1 + 4);
        assert_eq!(bytes[9], 0b0000_1010);
        assert_eq!(decode_encoded(&method), method);
    }

    #[test]
    fn test_bits_followed_by_bits_need_new_octet_after_eight() {
        let method = Method::BasicNack(BasicNack {
            delivery_tag: 42,
            multiple: true,
            requeue: true,
        });
        let bytes = encoded(&method);
        assert_eq!(bytes.len(), 4 + 8 + 1);
        assert_eq!(bytes[12], 0b11);
        assert_eq!(decode_encoded(&method), method);
    }

    #[test]
    fn test_bit_between_strings() {
        let method = Method::BasicDeliver(BasicDeliver {
            consumer_tag: "ctag".into(),
            delivery_tag: 7,
            redelivered: true,
            exchange: "orders".into(),
            routing_key: "created".into(),
        });
        assert_eq!(decode_encoded(&method), method);
    }

    #[test]
    fn test_connection_start_with_table() {
        let mut props = FieldTable::new();
        props.insert("product", FieldValue::LongString("RabbitMQ".into()));
        let method = Method::ConnectionStart(ConnectionStart {
            version_major: 0,
            version_minor: 9,
            server_properties: props,
            mechanisms: "PLAIN AMQPLAIN".into(),
            locales: "en_US".into(),
        });
        assert_eq!(decode_encoded(&method), method);
        assert_eq!(method.summary(), Some((None, "0.9".to_string())));
    }

    #[test]
    fn test_every_method_survives_encoding() {
        let methods = Method::every_method();
        assert_eq!(methods.len(), 62);
        for method in &methods {
            let decoded = decode_encoded(method);
            assert_eq!(&decoded, method, "{}", method.name());
        }
    }

    #[test]
    fn test_method_ids_are_unique() {
        let methods = Method::every_method();
        let mut ids: Vec<(u16, u16)> = methods.iter().map(|m| (m.class_id(), m.method_id())).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), methods.len());
    }

    #[test]
    fn test_unknown_ids() {
        let err = Method::decode(50, 99, Bytes::new()).unwrap_err();
        assert!(matches!(err, AmqpError::UnknownMethod { class_id: 50, method_id: 99 }));
        assert_eq!(err.code(), 601);

        let err = Method::decode(77, 10, Bytes::new()).unwrap_err();
        assert!(matches!(err, AmqpError::UnknownClass { class_id: 77 }));
        assert_eq!(err.code(), 602);
    }

    #[test]
    fn test_truncated_arguments_are_syntax_errors() {
        let err = Method::decode(50, 10, Bytes::from_static(&[0, 0, 5, b'q'])).unwrap_err();
        assert_eq!(err.code(), 502);
    }

    #[test]
    fn test_names_and_ids() {
        let method = Method::QueueDeclareOk(QueueDeclareOk::default());
        assert_eq!(method.name(), "queue declare-ok");
        assert_eq!(method.class_id(), CLASS_QUEUE);
        assert_eq!(method.method_id(), 11);
    }

    #[test]
    fn test_wait_follows_no_wait() {
        let declare = |no_wait| {
            Method::QueueDeclare(QueueDeclare {
                no_wait,
                ..QueueDeclare::default()
            })
        };
        assert!(declare(false).wait());
        assert!(!declare(true).wait());
        assert!(!Method::BasicPublish(BasicPublish::default()).wait());
        assert!(!Method::BasicAck(BasicAck::default()).wait());
        assert!(!Method::QueueDeclareOk(QueueDeclareOk::default()).wait());
        assert!(Method::BasicGet(BasicGet::default()).wait());
    }

    #[test]
    fn test_reply_pairing() {
        assert_eq!(
            Method::ConnectionStartOk(ConnectionStartOk::default()).request_method_id(),
            Some(10)
        );
        assert_eq!(
            Method::ExchangeUnbindOk(ExchangeUnbindOk::default()).request_method_id(),
            Some(40)
        );
        assert_eq!(
            Method::BasicGetEmpty(BasicGetEmpty::default()).request_method_id(),
            Some(70)
        );
        assert_eq!(Method::BasicGetOk(BasicGetOk::default()).request_method_id(), Some(70));
        assert_eq!(Method::QueueDeclare(QueueDeclare::default()).request_method_id(), None);
    }

    #[test]
    fn test_content_methods() {
        assert!(Method::BasicPublish(BasicPublish::default()).has_content());
        assert!(Method::BasicGetOk(BasicGetOk::default()).has_content());
        assert!(!Method::BasicGet(BasicGet::default()).has_content());
    }

    #[test]
    fn test_serialize_skips_reserved_fields() {
        let method = Method::ExchangeDeclare(ExchangeDeclare {
            exchange: "logs".into(),
            r#type: "fanout".into(),
            durable: true,
            ..ExchangeDeclare::default()
        });
        let value = serde_json::to_value(&method).unwrap();
        assert_eq!(value["exchange"], json!("logs"));
        assert_eq!(value["type"], json!("fanout"));
        assert_eq!(value["autoDelete"], json!(false));
        assert!(value.get("reserved1").is_none());
    }
}
