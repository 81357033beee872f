//! Global constants for procevents
//!
//! Kernel ABI values for the netlink process connector, taken from
//! `<linux/netlink.h>`, `<linux/connector.h>` and `<linux/cn_proc.h>`,
//! plus application-wide defaults.

/// Netlink protocol number of the kernel connector
pub const NETLINK_CONNECTOR: i32 = 11;

/// Envelope (`struct nlmsghdr`) size
pub const NLMSG_HDRLEN: usize = 16;

/// Envelope alignment
pub const NLMSG_ALIGNTO: usize = 4;

/// Envelope type carrying connector payloads
pub const NLMSG_DONE: u16 = 3;

/// Connector header (`struct cn_msg`) size
pub const CN_MSG_LEN: usize = 20;

/// Connector id and multicast group of the process events source
pub const CN_IDX_PROC: u32 = 0x1;
pub const CN_VAL_PROC: u32 = 0x1;

/// Process event header size: what, cpu, timestamp_ns
pub const PROC_EVENT_HDRLEN: usize = 16;

/// Multicast control operations
pub const PROC_CN_MCAST_LISTEN: u32 = 1;
pub const PROC_CN_MCAST_IGNORE: u32 = 2;

/// Event kinds
pub const PROC_EVENT_FORK: u32 = 0x0000_0001;
pub const PROC_EVENT_EXEC: u32 = 0x0000_0002;
pub const PROC_EVENT_EXIT: u32 = 0x8000_0000;

/// Event body sizes
pub const FORK_BODY_LEN: usize = 16;
pub const EXEC_BODY_LEN: usize = 8;
pub const EXIT_BODY_LEN: usize = 16;

/// `sizeof(struct proc_event)`: the kernel always sends the whole union,
/// whatever the event kind
pub const PROC_EVENT_LEN: usize = 40;

/// One kernel process event datagram
pub const PROC_EVENT_FRAME_LEN: usize = NLMSG_HDRLEN + CN_MSG_LEN + PROC_EVENT_LEN;

/// Size of a control frame: envelope, connector header, 4-byte op
pub const CONTROL_FRAME_LEN: usize = NLMSG_HDRLEN + CN_MSG_LEN + 4;

/// Application name used for the config directory and CLI
pub const APP_NAME: &str = "procevents";

/// Config file name inside the application config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Bounds for engine configuration values
pub const QUEUE_CAPACITY_MAX: usize = 65_536;
pub const RECEIVE_BUFFER_MIN: usize = 4096;
pub const RECEIVE_BUFFER_MAX: usize = 1_048_576;

/// Defaults for engine configuration values
pub const DEFAULT_QUEUE_CAPACITY: usize = 0;
pub const DEFAULT_ERROR_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 8192;
