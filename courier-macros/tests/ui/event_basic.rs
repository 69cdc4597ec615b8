use courier_core::message::Event;
use courier_macros::event;

#[event(name = "orders.placed")]
struct OrderPlaced {
    order_id: u64,
}

#[event]
struct CacheFlushed;

fn main() {
    let ev = OrderPlaced { order_id: 1 };
    assert_eq!(ev.clone().order_id, 1);
    assert_eq!(OrderPlaced::NAME, "orders.placed");
    assert_eq!(CacheFlushed::NAME, "CacheFlushed");
    let _ = format!("{:?}", CacheFlushed);
}
