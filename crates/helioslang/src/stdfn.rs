//! Lowerings for the compiler-synthesised members. Anything that needs to
//! walk a list is generated from the fixpoint combinator over
//! `chooseList`/`headList`/`tailList`/`mkCons`; everything else maps onto a
//! single builtin call.

use datacore::Data;
use uplc::builtin::Builtin;
use uplc::term::Const;

use crate::ir::{Builder, Ir, VarId};
use crate::source::Site;
use crate::texpr::{Member, TExpr};
use crate::types::Type;

impl<'a> Builder<'a> {
    fn list_elem(&self, recv: &TExpr) -> Type {
        match recv.ty.widen() {
            Type::List(e) => (*e).clone(),
            t => unreachable!("list member on {:?}", t),
        }
    }

    fn map_kv(&self, recv: &TExpr) -> (Type, Type) {
        match recv.ty.widen() {
            Type::Map(k, v) => ((*k).clone(), (*v).clone()),
            t => unreachable!("map member on {:?}", t),
        }
    }

    fn option_inner(&self, recv: &TExpr) -> Type {
        match recv.ty.widen() {
            Type::Named { args, .. } => args[0].clone(),
            t => unreachable!("option member on {:?}", t),
        }
    }

    pub(crate) fn lower_member(
        &mut self,
        m: Member,
        recv: &TExpr,
        args: &[TExpr],
        result_ty: &Type,
        site: Site,
    ) -> Ir {
        use Builtin as B;
        use Member::*;

        let recv_ty = recv.ty.clone();
        let r = self.lower_expr(recv);
        let a: Vec<Ir> = args.iter().map(|x| self.lower_expr(x)).collect();
        let mut a = a.into_iter();
        let mut arg = || a.next().expect("member arity checked");

        match m {
            IntAdd => self.builtin(B::AddInteger, vec![r, arg()], site),
            IntSub => self.builtin(B::SubtractInteger, vec![r, arg()], site),
            IntMul => self.builtin(B::MultiplyInteger, vec![r, arg()], site),
            IntDiv => self.builtin(B::QuotientInteger, vec![r, arg()], site),
            IntMod => self.builtin(B::RemainderInteger, vec![r, arg()], site),
            IntNeg => {
                let zero = self.int(0, site);
                self.builtin(B::SubtractInteger, vec![zero, r], site)
            }
            IntEq => self.builtin(B::EqualsInteger, vec![r, arg()], site),
            IntLt => self.builtin(B::LessThanInteger, vec![r, arg()], site),
            IntLe => self.builtin(B::LessThanEqualsInteger, vec![r, arg()], site),
            IntGt => self.builtin(B::LessThanInteger, vec![arg(), r], site),
            IntGe => self.builtin(B::LessThanEqualsInteger, vec![arg(), r], site),
            IntShow => self.int_show(r, site),

            BoolAnd => {
                let rhs = arg();
                let f = self.konst(Const::Bool(false), site);
                self.ite(r, rhs, f, site)
            }
            BoolOr => {
                let rhs = arg();
                let t = self.konst(Const::Bool(true), site);
                self.ite(r, t, rhs, site)
            }
            BoolNot => {
                let t = self.konst(Const::Bool(false), site);
                let f = self.konst(Const::Bool(true), site);
                self.builtin(B::IfThenElse, vec![r, t, f], site)
            }
            BoolEq => {
                let rhs = arg();
                self.bind("b", rhs, site, |b, bv| {
                    let nb = {
                        let t = b.konst(Const::Bool(false), site);
                        let f = b.konst(Const::Bool(true), site);
                        b.builtin(B::IfThenElse, vec![bv.clone(), t, f], site)
                    };
                    b.ite(r, bv, nb, site)
                })
            }

            StrAdd => self.builtin(B::AppendString, vec![r, arg()], site),
            StrEq => self.builtin(B::EqualsString, vec![r, arg()], site),
            StrEncodeUtf8 => self.builtin(B::EncodeUtf8, vec![r], site),

            BytesAdd => self.builtin(B::AppendByteString, vec![r, arg()], site),
            BytesEq => self.builtin(B::EqualsByteString, vec![r, arg()], site),
            BytesLt => self.builtin(B::LessThanByteString, vec![r, arg()], site),
            BytesLe => self.builtin(B::LessThanEqualsByteString, vec![r, arg()], site),
            BytesGt => self.builtin(B::LessThanByteString, vec![arg(), r], site),
            BytesGe => self.builtin(B::LessThanEqualsByteString, vec![arg(), r], site),
            BytesLength => self.builtin(B::LengthOfByteString, vec![r], site),
            BytesShow => self.bytes_show(r, site),
            BytesDecodeUtf8 => self.builtin(B::DecodeUtf8, vec![r], site),
            BytesSha2 => self.builtin(B::Sha2_256, vec![r], site),
            BytesSlice => {
                let start = arg();
                let n = arg();
                self.builtin(B::SliceByteString, vec![start, n, r], site)
            }

            DataEq => {
                let rhs = arg();
                let other_ty = args[0].ty.clone();
                let ld = self.to_data(&recv_ty, r, site);
                let rd = self.to_data(&other_ty, rhs, site);
                self.builtin(B::EqualsData, vec![ld, rd], site)
            }
            Serialize => {
                let d = self.to_data(&recv_ty, r, site);
                self.builtin(B::SerialiseData, vec![d], site)
            }
            FromData => self.from_data(result_ty, r, site),

            ListLength => self.seq_length(r, site),
            ListIsEmpty => self.builtin(B::NullList, vec![r], site),
            ListHead => {
                let elem = self.list_elem(recv);
                let h = self.builtin(B::HeadList, vec![r], site);
                self.from_data(&elem, h, site)
            }
            ListTail => self.builtin(B::TailList, vec![r], site),
            ListGet => {
                let elem = self.list_elem(recv);
                self.seq_get(r, arg(), &elem, site)
            }
            ListPrepend => {
                let elem = self.list_elem(recv);
                let x = arg();
                let d = self.to_data(&elem, x, site);
                self.builtin(B::MkCons, vec![d, r], site)
            }
            ListConcat => self.list_concat(r, arg(), site),
            ListAny => {
                let elem = self.list_elem(recv);
                self.list_search(r, arg(), &elem, false, site)
            }
            ListAll => {
                let elem = self.list_elem(recv);
                self.list_search(r, arg(), &elem, true, site)
            }
            ListFilter => {
                let elem = self.list_elem(recv);
                self.list_filter(r, arg(), &elem, site)
            }
            ListFold => {
                let elem = self.list_elem(recv);
                let f = arg();
                let z = arg();
                self.list_fold(r, f, z, &elem, site)
            }
            ListMap => {
                let elem = self.list_elem(recv);
                let Type::List(out) = result_ty.widen() else {
                    unreachable!("list map must produce a list")
                };
                self.list_map(r, arg(), &elem, &out, site)
            }
            ListFind => {
                let elem = self.list_elem(recv);
                self.list_find(r, arg(), &elem, site)
            }

            MapLength => self.seq_length(r, site),
            MapIsEmpty => self.builtin(B::NullList, vec![r], site),
            MapHead => self.builtin(B::HeadList, vec![r], site),
            MapGet => {
                let (k, v) = self.map_kv(recv);
                let key = arg();
                let kd = self.to_data(&k, key, site);
                self.map_get(r, kd, &v, false, site)
            }
            MapGetSafe => {
                let (k, v) = self.map_kv(recv);
                let key = arg();
                let kd = self.to_data(&k, key, site);
                self.map_get(r, kd, &v, true, site)
            }
            MapSet => {
                let (k, v) = self.map_kv(recv);
                let key = arg();
                let val = arg();
                let kd = self.to_data(&k, key, site);
                let vd = self.to_data(&v, val, site);
                let pair = self.builtin(B::MkPairData, vec![kd, vd], site);
                self.builtin(B::MkCons, vec![pair, r], site)
            }
            MapDelete => {
                let (k, _) = self.map_kv(recv);
                let key = arg();
                let kd = self.to_data(&k, key, site);
                self.map_delete(r, kd, site)
            }
            MapFilter => {
                let (k, v) = self.map_kv(recv);
                self.map_filter(r, arg(), &k, &v, site)
            }
            MapFold => {
                let (k, v) = self.map_kv(recv);
                let f = arg();
                let z = arg();
                self.map_fold(r, f, z, &k, &v, site)
            }
            MapMap => {
                let (k, v) = self.map_kv(recv);
                let Type::Map(_, out) = result_ty.widen() else {
                    unreachable!("map map must produce a map")
                };
                self.map_map(r, arg(), &k, &v, &out, site)
            }

            TupleFirst => {
                let p = self.builtin(B::FstPair, vec![r], site);
                self.from_data(result_ty, p, site)
            }
            TupleSecond => {
                let p = self.builtin(B::SndPair, vec![r], site);
                self.from_data(result_ty, p, site)
            }

            OptionUnwrap => {
                let inner = self.option_inner(recv);
                let u = self.builtin(B::UnConstrData, vec![r], site);
                let fields = self.builtin(B::SndPair, vec![u], site);
                let h = self.builtin(B::HeadList, vec![fields], site);
                self.from_data(&inner, h, site)
            }
            OptionIsSome => self.option_tag_is(r, 0, site),
            OptionIsNone => self.option_tag_is(r, 1, site),
        }
    }

    fn option_tag_is(&mut self, o: Ir, tag: i64, site: Site) -> Ir {
        let u = self.builtin(Builtin::UnConstrData, vec![o], site);
        let t = self.builtin(Builtin::FstPair, vec![u], site);
        let want = self.int(tag, site);
        self.builtin(Builtin::EqualsInteger, vec![t, want], site)
    }

    /// A recursive helper: `fix (\rec params. body)` with the recursion
    /// variable and parameters handed to the body constructor.
    fn recurse<F>(&mut self, names: &[&str], site: Site, body: F) -> Ir
    where
        F: FnOnce(&mut Self, Ir, Vec<Ir>) -> Ir,
    {
        let rec = self.fresh_var();
        let params: Vec<(VarId, String)> = names
            .iter()
            .map(|n| (self.fresh_var(), n.to_string()))
            .collect();
        let rec_ir = self.var(rec, "rec", site);
        let param_irs: Vec<Ir> = params.iter().map(|(v, n)| self.var(*v, n, site)).collect();
        let inner = body(self, rec_ir, param_irs);
        let lam = self.lam(params, inner, site);
        let g = self.lam(vec![(rec, "rec".to_string())], lam, site);
        self.fix(g, site)
    }

    fn head_tail(&self, xs: &Ir, site: Site) -> (Ir, Ir) {
        (
            self.builtin(Builtin::HeadList, vec![xs.clone()], site),
            self.builtin(Builtin::TailList, vec![xs.clone()], site),
        )
    }

    /// Shared by lists and maps: both are bytecode lists.
    fn seq_length(&mut self, xs: Ir, site: Site) -> Ir {
        let go = self.recurse(&["xs"], site, |b, rec, ps| {
            let xs = ps[0].clone();
            let (_, t) = b.head_tail(&xs, site);
            let rest = b.call(rec, vec![t], site);
            let one = b.int(1, site);
            let add = b.builtin(Builtin::AddInteger, vec![one, rest], site);
            let zero = b.int(0, site);
            b.choose_list(xs, zero, add, site)
        });
        self.call(go, vec![xs], site)
    }

    fn seq_get(&mut self, xs: Ir, i: Ir, elem: &Type, site: Site) -> Ir {
        let elem = elem.clone();
        let go = self.recurse(&["xs", "i"], site, |b, rec, ps| {
            let (xs, i) = (ps[0].clone(), ps[1].clone());
            let (h, t) = b.head_tail(&xs, site);
            let zero = b.int(0, site);
            let at_zero = b.builtin(Builtin::EqualsInteger, vec![i.clone(), zero], site);
            let found = b.from_data(&elem, h, site);
            let one = b.int(1, site);
            let i2 = b.builtin(Builtin::SubtractInteger, vec![i, one], site);
            let next = b.call(rec, vec![t, i2], site);
            let step = b.ite(at_zero, found, next, site);
            let oob = b.error("index out of range", site);
            b.choose_list(xs, oob, step, site)
        });
        self.call(go, vec![xs, i], site)
    }

    fn list_concat(&mut self, xs: Ir, ys: Ir, site: Site) -> Ir {
        self.bind("ys", ys, site, |b, ysv| {
            let go = b.recurse(&["xs"], site, |b, rec, ps| {
                let xs = ps[0].clone();
                let (h, t) = b.head_tail(&xs, site);
                let rest = b.call(rec, vec![t], site);
                let cons = b.builtin(Builtin::MkCons, vec![h, rest], site);
                b.choose_list(xs, ysv, cons, site)
            });
            b.call(go, vec![xs], site)
        })
    }

    /// `any` (stop=false short-circuits on true) and `all` (conjunctive).
    fn list_search(&mut self, xs: Ir, f: Ir, elem: &Type, all: bool, site: Site) -> Ir {
        let elem = elem.clone();
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["xs"], site, |b, rec, ps| {
                let xs = ps[0].clone();
                let (h, t) = b.head_tail(&xs, site);
                let x = b.from_data(&elem, h, site);
                let hit = b.call(fv, vec![x], site);
                let rest = b.call(rec, vec![t], site);
                let step = if all {
                    let stop = b.konst(Const::Bool(false), site);
                    b.ite(hit, rest, stop, site)
                } else {
                    let stop = b.konst(Const::Bool(true), site);
                    b.ite(hit, stop, rest, site)
                };
                let empty = b.konst(Const::Bool(all), site);
                b.choose_list(xs, empty, step, site)
            });
            b.call(go, vec![xs], site)
        })
    }

    fn list_filter(&mut self, xs: Ir, f: Ir, elem: &Type, site: Site) -> Ir {
        let elem = elem.clone();
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["xs"], site, |b, rec, ps| {
                let xs = ps[0].clone();
                let (h, t) = b.head_tail(&xs, site);
                let rest = b.call(rec, vec![t], site);
                let step = b.bind("h", h, site, |b, hv| {
                    b.bind("rest", rest, site, |b, restv| {
                        let x = b.from_data(&elem, hv.clone(), site);
                        let keep = b.call(fv, vec![x], site);
                        let cons = b.builtin(Builtin::MkCons, vec![hv, restv.clone()], site);
                        b.ite(keep, cons, restv, site)
                    })
                });
                let empty = b.nil_data(site);
                b.choose_list(xs, empty, step, site)
            });
            b.call(go, vec![xs], site)
        })
    }

    fn list_fold(&mut self, xs: Ir, f: Ir, z: Ir, elem: &Type, site: Site) -> Ir {
        let elem = elem.clone();
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["acc", "xs"], site, |b, rec, ps| {
                let (acc, xs) = (ps[0].clone(), ps[1].clone());
                let (h, t) = b.head_tail(&xs, site);
                let x = b.from_data(&elem, h, site);
                let acc2 = b.call(fv, vec![acc.clone(), x], site);
                let step = b.call(rec, vec![acc2, t], site);
                b.choose_list(xs, acc, step, site)
            });
            b.call(go, vec![z, xs], site)
        })
    }

    fn list_map(&mut self, xs: Ir, f: Ir, elem: &Type, out: &Type, site: Site) -> Ir {
        let (elem, out) = (elem.clone(), out.clone());
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["xs"], site, |b, rec, ps| {
                let xs = ps[0].clone();
                let (h, t) = b.head_tail(&xs, site);
                let x = b.from_data(&elem, h, site);
                let y = b.call(fv, vec![x], site);
                let yd = b.to_data(&out, y, site);
                let rest = b.call(rec, vec![t], site);
                let cons = b.builtin(Builtin::MkCons, vec![yd, rest], site);
                let empty = b.nil_data(site);
                b.choose_list(xs, empty, cons, site)
            });
            b.call(go, vec![xs], site)
        })
    }

    fn list_find(&mut self, xs: Ir, f: Ir, elem: &Type, site: Site) -> Ir {
        let elem = elem.clone();
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["xs"], site, |b, rec, ps| {
                let xs = ps[0].clone();
                let (h, t) = b.head_tail(&xs, site);
                let step = b.bind("h", h, site, |b, hv| {
                    let x = b.from_data(&elem, hv.clone(), site);
                    let hit = b.call(fv, vec![x], site);
                    let found = b.from_data(&elem, hv, site);
                    let next = b.call(rec, vec![t], site);
                    b.ite(hit, found, next, site)
                });
                let missing = b.error("not found", site);
                b.choose_list(xs, missing, step, site)
            });
            b.call(go, vec![xs], site)
        })
    }

    fn map_get(&mut self, ps_ir: Ir, kd: Ir, v: &Type, safe: bool, site: Site) -> Ir {
        let v = v.clone();
        self.bind("key", kd, site, |b, kv| {
            let go = b.recurse(&["ps"], site, |b, rec, params| {
                let ps = params[0].clone();
                let (h, t) = b.head_tail(&ps, site);
                let step = b.bind("entry", h, site, |b, hv| {
                    let hk = b.builtin(Builtin::FstPair, vec![hv.clone()], site);
                    let hit = b.builtin(Builtin::EqualsData, vec![hk, kv], site);
                    let value = b.builtin(Builtin::SndPair, vec![hv], site);
                    let found = if safe {
                        let tag = b.int(0, site);
                        let nil = b.nil_data(site);
                        let fields = b.builtin(Builtin::MkCons, vec![value, nil], site);
                        b.builtin(Builtin::ConstrData, vec![tag, fields], site)
                    } else {
                        b.from_data(&v, value, site)
                    };
                    let next = b.call(rec, vec![t], site);
                    b.ite(hit, found, next, site)
                });
                let missing = if safe {
                    b.konst(Const::Data(Data::none()), site)
                } else {
                    b.error("not found", site)
                };
                b.choose_list(ps, missing, step, site)
            });
            b.call(go, vec![ps_ir], site)
        })
    }

    fn map_delete(&mut self, ps_ir: Ir, kd: Ir, site: Site) -> Ir {
        self.bind("key", kd, site, |b, kv| {
            let go = b.recurse(&["ps"], site, |b, rec, params| {
                let ps = params[0].clone();
                let (h, t) = b.head_tail(&ps, site);
                let rest = b.call(rec, vec![t], site);
                let step = b.bind("entry", h, site, |b, hv| {
                    b.bind("rest", rest, site, |b, restv| {
                        let hk = b.builtin(Builtin::FstPair, vec![hv.clone()], site);
                        let hit = b.builtin(Builtin::EqualsData, vec![hk, kv], site);
                        let keep = b.builtin(Builtin::MkCons, vec![hv, restv.clone()], site);
                        b.ite(hit, restv, keep, site)
                    })
                });
                let empty = b.nil_pair(site);
                b.choose_list(ps, empty, step, site)
            });
            b.call(go, vec![ps_ir], site)
        })
    }

    fn map_filter(&mut self, ps_ir: Ir, f: Ir, k: &Type, v: &Type, site: Site) -> Ir {
        let (k, v) = (k.clone(), v.clone());
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["ps"], site, |b, rec, params| {
                let ps = params[0].clone();
                let (h, t) = b.head_tail(&ps, site);
                let rest = b.call(rec, vec![t], site);
                let step = b.bind("entry", h, site, |b, hv| {
                    b.bind("rest", rest, site, |b, restv| {
                        let hk = b.builtin(Builtin::FstPair, vec![hv.clone()], site);
                        let hv2 = b.builtin(Builtin::SndPair, vec![hv.clone()], site);
                        let kx = b.from_data(&k, hk, site);
                        let vx = b.from_data(&v, hv2, site);
                        let keep = b.call(fv, vec![kx, vx], site);
                        let cons = b.builtin(Builtin::MkCons, vec![hv, restv.clone()], site);
                        b.ite(keep, cons, restv, site)
                    })
                });
                let empty = b.nil_pair(site);
                b.choose_list(ps, empty, step, site)
            });
            b.call(go, vec![ps_ir], site)
        })
    }

    fn map_fold(&mut self, ps_ir: Ir, f: Ir, z: Ir, k: &Type, v: &Type, site: Site) -> Ir {
        let (k, v) = (k.clone(), v.clone());
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["acc", "ps"], site, |b, rec, params| {
                let (acc, ps) = (params[0].clone(), params[1].clone());
                let (h, t) = b.head_tail(&ps, site);
                let step = b.bind("entry", h, site, |b, hv| {
                    let hk = b.builtin(Builtin::FstPair, vec![hv.clone()], site);
                    let hv2 = b.builtin(Builtin::SndPair, vec![hv], site);
                    let kx = b.from_data(&k, hk, site);
                    let vx = b.from_data(&v, hv2, site);
                    let acc2 = b.call(fv, vec![acc.clone(), kx, vx], site);
                    b.call(rec, vec![acc2, t], site)
                });
                b.choose_list(ps, acc, step, site)
            });
            b.call(go, vec![z, ps_ir], site)
        })
    }

    fn map_map(&mut self, ps_ir: Ir, f: Ir, k: &Type, v: &Type, out: &Type, site: Site) -> Ir {
        let (k, v, out) = (k.clone(), v.clone(), out.clone());
        self.bind("f", f, site, |b, fv| {
            let go = b.recurse(&["ps"], site, |b, rec, params| {
                let ps = params[0].clone();
                let (h, t) = b.head_tail(&ps, site);
                let step = b.bind("entry", h, site, |b, hv| {
                    let hk = b.builtin(Builtin::FstPair, vec![hv.clone()], site);
                    let hv2 = b.builtin(Builtin::SndPair, vec![hv], site);
                    let kx = b.from_data(&k, hk.clone(), site);
                    let vx = b.from_data(&v, hv2, site);
                    let y = b.call(fv, vec![kx, vx], site);
                    let yd = b.to_data(&out, y, site);
                    let pair = b.builtin(Builtin::MkPairData, vec![hk, yd], site);
                    let rest = b.call(rec, vec![t], site);
                    b.builtin(Builtin::MkCons, vec![pair, rest], site)
                });
                let empty = b.nil_pair(site);
                b.choose_list(ps, empty, step, site)
            });
            b.call(go, vec![ps_ir], site)
        })
    }

    /// Decimal rendering of an integer, sign included.
    fn int_show(&mut self, n: Ir, site: Site) -> Ir {
        self.bind("n", n, site, |b, nv| {
            let digits = b.recurse(&["n"], site, |b, rec, ps| {
                let n = ps[0].clone();
                let ten = b.int(10, site);
                let small = b.builtin(Builtin::LessThanInteger, vec![n.clone(), ten.clone()], site);
                let digit = |b: &mut Self, x: Ir| {
                    let base = b.int(48, site);
                    let code = b.builtin(Builtin::AddInteger, vec![base, x], site);
                    let empty = b.konst(Const::Bytes(Vec::new()), site);
                    b.builtin(Builtin::ConsByteString, vec![code, empty], site)
                };
                let last = digit(b, n.clone());
                let q = b.builtin(Builtin::QuotientInteger, vec![n.clone(), ten.clone()], site);
                let rest = b.call(rec, vec![q], site);
                let rdig = b.builtin(Builtin::RemainderInteger, vec![n, ten], site);
                let rbyte = digit(b, rdig);
                let long = b.builtin(Builtin::AppendByteString, vec![rest, rbyte], site);
                b.ite(small, last, long, site)
            });
            b.bind("digits", digits, site, |b, dv| {
                let zero = b.int(0, site);
                let negative =
                    b.builtin(Builtin::LessThanInteger, vec![nv.clone(), zero.clone()], site);
                let pos = b.call(dv.clone(), vec![nv.clone()], site);
                let negated = b.builtin(Builtin::SubtractInteger, vec![zero, nv], site);
                let mag = b.call(dv, vec![negated], site);
                let minus = b.konst(Const::Bytes(vec![b'-']), site);
                let signed = b.builtin(Builtin::AppendByteString, vec![minus, mag], site);
                let bytes = b.ite(negative, signed, pos, site);
                b.builtin(Builtin::DecodeUtf8, vec![bytes], site)
            })
        })
    }

    /// Lowercase hex rendering of a byte array.
    fn bytes_show(&mut self, bytes: Ir, site: Site) -> Ir {
        self.bind("bytes", bytes, site, |b, bv| {
            let hexdigit = {
                let x = b.fresh_var();
                let xv = b.var(x, "x", site);
                let ten = b.int(10, site);
                let small = b.builtin(Builtin::LessThanInteger, vec![xv.clone(), ten], site);
                let num = {
                    let base = b.int(48, site);
                    b.builtin(Builtin::AddInteger, vec![base, xv.clone()], site)
                };
                let alpha = {
                    let base = b.int(87, site);
                    b.builtin(Builtin::AddInteger, vec![base, xv], site)
                };
                let body = b.ite(small, num, alpha, site);
                b.lam(vec![(x, "x".to_string())], body, site)
            };
            b.bind("hexdigit", hexdigit, site, |b, hd| {
                let len = b.builtin(Builtin::LengthOfByteString, vec![bv.clone()], site);
                b.bind("len", len, site, |b, lenv| {
                    let go = b.recurse(&["i"], site, |b, rec, ps| {
                        let i = ps[0].clone();
                        let done = b.builtin(
                            Builtin::EqualsInteger,
                            vec![i.clone(), lenv],
                            site,
                        );
                        let empty = b.konst(Const::Bytes(Vec::new()), site);
                        let byte = b.builtin(
                            Builtin::IndexByteString,
                            vec![bv, i.clone()],
                            site,
                        );
                        let step = b.bind("byte", byte, site, |b, bytev| {
                            let sixteen = b.int(16, site);
                            let hi = b.builtin(
                                Builtin::QuotientInteger,
                                vec![bytev.clone(), sixteen.clone()],
                                site,
                            );
                            let lo = b.builtin(
                                Builtin::RemainderInteger,
                                vec![bytev, sixteen],
                                site,
                            );
                            let hic = b.call(hd.clone(), vec![hi], site);
                            let loc = b.call(hd.clone(), vec![lo], site);
                            let nilb = b.konst(Const::Bytes(Vec::new()), site);
                            let locs = b.builtin(Builtin::ConsByteString, vec![loc, nilb], site);
                            let pairb = b.builtin(Builtin::ConsByteString, vec![hic, locs], site);
                            let one = b.int(1, site);
                            let i2 = b.builtin(Builtin::AddInteger, vec![i, one], site);
                            let rest = b.call(rec, vec![i2], site);
                            b.builtin(Builtin::AppendByteString, vec![pairb, rest], site)
                        });
                        b.ite(done, empty, step, site)
                    });
                    let zero = b.int(0, site);
                    let hex = b.call(go, vec![zero], site);
                    b.builtin(Builtin::DecodeUtf8, vec![hex], site)
                })
            })
        })
    }
}
