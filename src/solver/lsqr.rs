// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! LSQR (Paige & Saunders 1982) applied to the normal equations. Because `N`
//! is symmetric, both of the method's products are `N v`.

use log::{debug, warn};

use super::{LinearSolver, NormalEquations, SolveError};

#[derive(Debug, Clone, Copy)]
pub struct Lsqr {
    pub atol: f64,
    pub btol: f64,
    pub max_iterations: usize,
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn scale(v: &mut [f64], factor: f64) {
    v.iter_mut().for_each(|x| *x *= factor);
}

impl LinearSolver for Lsqr {
    fn name(&self) -> &'static str {
        "lsqr"
    }

    fn solve(&self, normal: &NormalEquations) -> Result<Vec<f64>, SolveError> {
        let n = normal.dim();
        let mut x = vec![0.0; n];

        let mut u = normal.rhs().to_vec();
        let bnorm = norm(&u);
        if bnorm == 0.0 {
            return Ok(x);
        }
        let mut beta = bnorm;
        scale(&mut u, 1.0 / beta);
        let mut v = normal.mul_vec(&u);
        let mut alpha = norm(&v);
        if alpha == 0.0 {
            return Ok(x);
        }
        scale(&mut v, 1.0 / alpha);
        let mut w = v.clone();

        let mut phibar = beta;
        let mut rhobar = alpha;
        let mut anorm_sq = 0.0;
        let mut converged = false;
        let mut iterations = 0;
        let mut rnorm = beta;

        while iterations < self.max_iterations {
            iterations += 1;

            // Continue the bidiagonalisation.
            let nv = normal.mul_vec(&v);
            u.iter_mut().zip(&nv).for_each(|(u, nv)| *u = nv - alpha * *u);
            beta = norm(&u);
            if beta > 0.0 {
                scale(&mut u, 1.0 / beta);
                anorm_sq += alpha * alpha + beta * beta;
                let nu = normal.mul_vec(&u);
                v.iter_mut().zip(&nu).for_each(|(v, nu)| *v = nu - beta * *v);
                alpha = norm(&v);
                if alpha > 0.0 {
                    scale(&mut v, 1.0 / alpha);
                }
            }

            // Eliminate the subdiagonal element with a plane rotation.
            let rho = rhobar.hypot(beta);
            let c = rhobar / rho;
            let s = beta / rho;
            let theta = s * alpha;
            rhobar = -c * alpha;
            let phi = c * phibar;
            phibar *= s;
            let tau = s * phi;

            let t1 = phi / rho;
            let t2 = -theta / rho;
            for ((x, w), v) in x.iter_mut().zip(w.iter_mut()).zip(&v) {
                *x += t1 * *w;
                *w = v + t2 * *w;
            }

            rnorm = phibar;
            let anorm = anorm_sq.sqrt();
            let xnorm = norm(&x);
            let arnorm = alpha * tau.abs();
            let test1 = rnorm / bnorm;
            let test2 = arnorm / (anorm * rnorm + f64::EPSILON);
            let rtol = self.btol + self.atol * anorm * xnorm / bnorm;
            if test1 <= rtol || test2 <= self.atol || alpha == 0.0 {
                converged = true;
                break;
            }
        }

        if converged {
            debug!("LSQR converged after {iterations} iterations (residual norm {rnorm:e})");
        } else {
            warn!(
                "LSQR did not converge within {} iterations (residual norm {rnorm:e})",
                self.max_iterations
            );
        }
        Ok(x)
    }
}
