pub mod basket;
pub mod payment;
pub mod tenant;
pub mod voucher;
