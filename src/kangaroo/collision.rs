//! Collision resolution
//!
//! A tame/wild collision on x means d_T·G = ±(K + d_W·G), with each distance
//! possibly carrying an extra sign from symmetry normalisation. All four sign
//! candidates are formed and checked against K and -K; the surviving one is
//! shifted back into the absolute key range and verified against the original
//! public key.

use std::fs::OpenOptions;
use std::io::Write;

use log::warn;

use crate::kangaroo::context::KeyContext;
use crate::math::bigint::BigInt256;
use crate::types::{HerdKind, Solution};

pub struct Resolver<'a> {
    ctx: &'a KeyContext,
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: &'a KeyContext) -> Self {
        Resolver { ctx }
    }

    /// Resolve a cross-herd collision; `None` means every candidate failed
    /// (reported, walk continues).
    pub fn resolve(
        &self,
        d1: &BigInt256,
        kind1: HerdKind,
        d2: &BigInt256,
        kind2: HerdKind,
    ) -> Option<Solution> {
        debug_assert_ne!(kind1, kind2);
        let (td, wd) = if kind1 == HerdKind::Tame { (*d1, *d2) } else { (*d2, *d1) };

        let curve = &self.ctx.curve;
        for candidate in 0u8..4 {
            let t = if candidate & 1 != 0 { curve.order_neg(&td) } else { td };
            let w = if candidate & 2 != 0 { curve.order_neg(&wd) } else { wd };
            let pk = curve.order_add(&t, &w);
            let p = curve.mul_g(&pk);
            if p == self.ctx.key_search {
                if let Some(sol) = self.finish(pk, 'N', candidate) {
                    return Some(sol);
                }
            }
            if p == self.ctx.key_search_neg {
                if let Some(sol) = self.finish(curve.order_neg(&pk), 'S', candidate) {
                    return Some(sol);
                }
            }
        }

        warn!("unexpected wrong collision, reset kangaroo !");
        warn!("found: Td{}", self.signed_hex(&td));
        warn!("found: Wd{}", self.signed_hex(&wd));
        None
    }

    /// Undo the walk translation and emit the solution.
    fn finish(&self, pk: BigInt256, sign_info: char, candidate: u8) -> Option<Solution> {
        let curve = &self.ctx.curve;
        let mut pk = pk;
        if self.ctx.params.use_symmetry {
            pk = curve.order_add(&pk, &self.ctx.range.width_div2);
        }
        pk = curve.order_add(&pk, &self.ctx.range.start);

        let recomputed = curve.mul_g(&pk);
        let pub_hex = curve.public_key_hex(&self.ctx.key);
        if recomputed == self.ctx.key {
            self.output(&format!(
                "Key#{:2} [{}{}]Pub:  0x{} \n       Priv: 0x{} \n",
                self.ctx.key_index,
                candidate,
                sign_info,
                pub_hex,
                pk.to_hex_padded()
            ));
            Some(Solution {
                private_key: pk,
                public_key: self.ctx.key,
                sign_info,
                candidate,
            })
        } else {
            self.output(&format!(
                "Key#{:2} [{}{}]Pub:  0x{} \n       Failed !\n",
                self.ctx.key_index, candidate, sign_info, pub_hex
            ));
            None
        }
    }

    fn signed_hex(&self, d: &BigInt256) -> String {
        if *d > self.ctx.curve.half_n {
            format!("-{}", self.ctx.curve.order_neg(d).to_hex())
        } else {
            format!(" {}", d.to_hex())
        }
    }

    fn output(&self, text: &str) {
        if let Some(path) = &self.ctx.params.output_file {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(mut f) => {
                    if f.write_all(text.as_bytes()).is_ok() {
                        return;
                    }
                    warn!("cannot write to {}", path.display());
                }
                Err(e) => warn!("cannot open {} for writing: {e}", path.display()),
            }
        }
        println!("\n{text}");
    }
}
