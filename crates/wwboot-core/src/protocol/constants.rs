// Report geometry
pub const REPORT_SIZE: usize = 64;
pub const COMMAND_CODE_SIZE: usize = 4;
pub const PAYLOAD_SIZE: usize = REPORT_SIZE - COMMAND_CODE_SIZE; // 60

// Flash geometry
pub const PAGE_SIZE: usize = 128;
pub const HALF_PAGE_SIZE: usize = PAGE_SIZE / 2;
pub const DEFAULT_PAGE_SIZE: usize = PAGE_SIZE;

/// First byte of application flash; the application's vector table lives here.
pub const APPLICATION_BASE: u32 = 0x0800_2000;

// Bootloader command codes
pub const CMD_RESET: u32 = 0xFFFF_FFFF;
pub const CMD_RESET_LEGACY: u32 = 0x0000_0000;
pub const CMD_PROGRAM: u32 = 0x0000_0080;
pub const CMD_EXIT: u32 = 0x0000_00C3;
pub const CMD_ABORT: u32 = 0x0000_003E;

// Application command codes
pub const CMD_SET_TIME: u32 = 1;
pub const CMD_ENTER_BOOTLOADER: u32 = 2;

// Status flag bits
pub const STATUS_ERR_INTERNAL: u32 = 0x01;
pub const STATUS_ERR_COMMAND: u32 = 0x02;
pub const STATUS_ERR_ADDRESS: u32 = 0x04;
pub const STATUS_ERR_CRC32: u32 = 0x08;
pub const STATUS_ERR_WRITE: u32 = 0x10;
pub const STATUS_ERR_SHORT_REPORT: u32 = 0x20;

// Exchange timing
pub const RESET_REPEAT: usize = 3;
pub const RESET_DRAIN_ATTEMPTS: usize = 3;
pub const STATUS_POLL_TIMEOUT_MS: u64 = 1000;

// USB identity
pub const WATCH_VENDOR_ID: u16 = 0x16C0;
pub const WATCH_PRODUCT_ID: u16 = 0x05DC;
pub const WATCH_MANUFACTURER: &str = "kevincuzner.com";
pub const BOOTLOADER_PRODUCT: &str = "LED Wristwatch Bootloader";
pub const APPLICATION_PRODUCT: &str = "LED Wristwatch";

pub const HID_INTERFACE: u8 = 0;

// HID class requests
pub const HID_REQ_SET_REPORT: u8 = 0x09;
pub const HID_REPORT_TYPE_OUTPUT: u16 = 0x02;
