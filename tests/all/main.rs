mod checkout;
mod lifecycle;
