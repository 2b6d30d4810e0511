//! Derivative-free minimisation

/// Minimise `f` over R^N with the Nelder-Mead simplex method
///
/// The initial simplex offsets each coordinate of `start` by one. Iteration
/// stops once the spread of simplex values falls below a relative `1e-10`
/// or after `max_iter` steps. Returns the best point and its value.
pub fn nelder_mead<const N: usize, F>(f: F, start: [f64; N], max_iter: usize) -> ([f64; N], f64)
where
    F: Fn(&[f64; N]) -> f64,
{
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let mut simplex: Vec<([f64; N], f64)> = Vec::with_capacity(N + 1);
    simplex.push((start, f(&start)));
    for d in 0..N {
        let mut point = start;
        point[d] += 1.0;
        simplex.push((point, f(&point)));
    }

    let blend = |a: &[f64; N], b: &[f64; N], w: f64| -> [f64; N] {
        let mut out = *a;
        for d in 0..N {
            out[d] += w * (b[d] - a[d]);
        }
        out
    };

    for _ in 0..max_iter {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[N].1;
        if (worst - best).abs() <= 1e-10 * (1.0 + best.abs()) {
            break;
        }

        let mut centroid = [0.0; N];
        for (point, _) in &simplex[..N] {
            for d in 0..N {
                centroid[d] += point[d] / N as f64;
            }
        }

        let (worst_point, f_worst) = simplex[N];
        let reflected = blend(&centroid, &worst_point, -REFLECT);
        let f_reflected = f(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = blend(&centroid, &worst_point, -EXPAND);
            let f_expanded = f(&expanded);
            simplex[N] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[N - 1].1 {
            simplex[N] = (reflected, f_reflected);
        } else {
            let (target, f_target) = if f_reflected < f_worst {
                (reflected, f_reflected)
            } else {
                (worst_point, f_worst)
            };
            let contracted = blend(&centroid, &target, CONTRACT);
            let f_contracted = f(&contracted);
            if f_contracted < f_target {
                simplex[N] = (contracted, f_contracted);
            } else {
                let anchor = simplex[0].0;
                for entry in simplex.iter_mut().skip(1) {
                    let point = blend(&anchor, &entry.0, SHRINK);
                    *entry = (point, f(&point));
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex[0]
}
