use std::collections::LinkedList;

use mpp::point_to_point::{Message, MessageMut};
use mpp::Universe;

#[test]
fn scalar_roundtrip() {
    let universe = mpp::initialize(2);
    assert_eq!(universe.size(), 2);
    universe.run(|world| {
        if world.rank() == 0 {
            world.at(1).send_value(42i32).unwrap();
        } else {
            let mut x = 0i32;
            let status = world.at(0).receive_into(&mut x).unwrap();
            assert_eq!(x, 42);
            assert_eq!(status.source().rank(), 0);
            assert_eq!(status.tag(), 0);
            assert_eq!(status.error(), 0);
        }
    });
}

#[test]
fn send_value_through_a_generic_helper() {
    // send_value must work for any buffer type, without a 'static bound
    fn relay<B: mpp::datatype::traits::Buffer>(ep: mpp::topology::Endpoint<'_>, value: B) {
        ep.send_value(value).unwrap();
    }

    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            relay(world.at(1), 6u16);
            relay(world.at(1), vec![1i8, -1]);
        } else {
            let mut small = 0u16;
            world.at(0).receive_into(&mut small).unwrap();
            assert_eq!(small, 6);
            let mut pair = vec![0i8; 2];
            world.at(0).receive_into(&mut pair).unwrap();
            assert_eq!(pair, [1, -1]);
        }
    });
}

#[test]
fn vector_roundtrip_reports_count() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            world.at(1).send_value(vec![3u64, 1, 4, 1, 5]).unwrap();
        } else {
            // room for more elements than arrive
            let mut buf = vec![0u64; 8];
            let status = world.at(0).receive_into(&mut buf).unwrap();
            assert_eq!(status.count(), 5);
            assert_eq!(&buf[..5], [3, 1, 4, 1, 5]);
        }
    });
}

#[test]
fn fixed_array_roundtrip() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            world.at(1).send_value([0.5f64, 1.5, 2.5]).unwrap();
        } else {
            let mut buf = [0.0f64; 3];
            world.at(0).receive_into(&mut buf).unwrap();
            assert_eq!(buf, [0.5, 1.5, 2.5]);
        }
    });
}

#[test]
fn slice_message_roundtrip() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            let data = [1.5f32, 2.5, 3.5, 4.5];
            world.at(1).send(&Message::new(&data[1..3], 7)).unwrap();
        } else {
            let mut buf = vec![0.0f32; 2];
            let mut msg = MessageMut::new(&mut buf[..], 7);
            let status = world.at(0).receive_msg(&mut msg).unwrap();
            assert_eq!(status.tag(), 7);
            assert_eq!(status.count(), 2);
            assert_eq!(msg.get(), &[2.5, 3.5]);
        }
    });
}

#[test]
fn tags_match_out_of_arrival_order() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            world
                .at(1)
                .send(&Message::owned(100i32, 11))
                .unwrap()
                .send(&Message::owned(101i32, 0))
                .unwrap();
        } else {
            let mut x = 0i32;
            // the tag 0 message arrived second but matches first
            let status = world.at(0).receive_into(&mut x).unwrap();
            assert_eq!((x, status.tag()), (101, 0));
            let mut msg = MessageMut::new(&mut x, 11);
            let status = world.at(0).receive_msg(&mut msg).unwrap();
            assert_eq!(status.tag(), 11);
            assert_eq!(*msg.get(), 100);
        }
    });
}

#[test]
fn ping_pong_over_wildcard_receives() {
    let universe = Universe::new(2);
    universe.run(|world| {
        let me = world.rank();
        let mut p = 0i32;
        if me == 0 {
            p = 1;
            world.at(1).send_value(p).unwrap();
        }
        loop {
            let status = world.any().receive_into(&mut p).unwrap();
            assert_eq!(status.source().rank(), 1 - me);
            assert_eq!(p % 2 == 0, me == 0);
            if p >= 10 {
                break;
            }
            p += 1;
            status.source().send_value(p).unwrap();
            if p >= 10 {
                break;
            }
        }
    });
}

#[test]
fn linked_list_gathers_into_vector() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            let list: LinkedList<f64> = [10.0, 20.0, 30.0].into_iter().collect();
            world.at(1).send(&Message::new(&list, 3)).unwrap();
        } else {
            let mut buf = vec![0.0f64; 3];
            let mut msg = MessageMut::new(&mut buf[..], 3);
            let status = world.at(0).receive_msg(&mut msg).unwrap();
            assert_eq!(status.count(), 3);
            assert_eq!(msg.get(), &[10.0, 20.0, 30.0]);
        }
    });
}

#[test]
fn vector_scatters_into_linked_list() {
    let universe = Universe::new(2);
    universe.run(|world| {
        if world.rank() == 0 {
            world.at(1).send_value(vec![7i32, 8, 9]).unwrap();
        } else {
            let mut list: LinkedList<i32> = [0, 0, 0].into_iter().collect();
            world.at(0).receive_into(&mut list).unwrap();
            let gathered: Vec<i32> = list.into_iter().collect();
            assert_eq!(gathered, [7, 8, 9]);
        }
    });
}
